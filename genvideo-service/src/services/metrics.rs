use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Later calls are no-ops, so every
/// test app in a process can call this.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
            describe_metrics();
        }
        Err(e) => tracing::warn!(error = %e, "Prometheus recorder not installed"),
    }
}

fn describe_metrics() {
    metrics::describe_counter!("videos_rendered_total", "Videos rendered, by outcome");
    metrics::describe_histogram!(
        "video_render_seconds",
        metrics::Unit::Seconds,
        "Wall-clock time spent rendering a video"
    );
    metrics::describe_counter!(
        "payments_completed_total",
        "Orders that credited a subscription, by trigger"
    );
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_render(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("videos_rendered_total", "outcome" => outcome).increment(1);
    metrics::histogram!("video_render_seconds").record(elapsed.as_secs_f64());
}

/// `trigger` is the endpoint that observed the payment (`poll` or `webhook`).
pub fn record_payment_completed(trigger: &'static str, subscription: &str) {
    metrics::counter!(
        "payments_completed_total",
        "trigger" => trigger,
        "subscription" => subscription.to_string()
    )
    .increment(1);
}
