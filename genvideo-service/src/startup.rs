//! Application startup and lifecycle management.

use crate::config::GenvideoConfig;
use crate::media::{ffmpeg::RenderSettings, CommandExecutor, FfmpegRenderer};
use crate::services::{Database, EmailService};
use crate::{build_router, AppState, Backends};
use axum::Router;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Connect to PostgreSQL, run migrations and bind the listener.
    pub async fn build(config: GenvideoConfig) -> Result<Self, AppError> {
        let database = Database::connect(
            config.database.url.expose_secret(),
            config.database.max_connections,
        )
        .await?;
        database.run_migrations().await?;
        let database = Arc::new(database);

        let email = EmailService::new(&config.smtp)?;

        let media = &config.media;
        tokio::fs::create_dir_all(&media.output_base_folder).await?;
        tokio::fs::create_dir_all(&media.work_folder).await?;

        let renderer = FfmpegRenderer::new(
            CommandExecutor::new(Duration::from_secs(media.render_timeout_seconds)),
            media.ffmpeg_path.clone(),
            media.ffprobe_path.clone(),
            RenderSettings {
                width: media.video_width,
                height: media.video_height,
                fps: media.video_fps,
                font_file: media.caption_font_file.clone(),
            },
            media.max_concurrent_renders,
        );

        let backends = Backends {
            users: database.clone(),
            videos: database.clone(),
            payments: database,
            email: Arc::new(email),
            renderer: Arc::new(renderer),
        };

        Self::build_with(config, backends).await
    }

    /// Bind with caller-supplied backends. Port 0 picks a free port.
    pub async fn build_with(config: GenvideoConfig, backends: Backends) -> Result<Self, AppError> {
        let addr = format!("{}:{}", config.common.host, config.common.port);
        let state = AppState::new(config, backends)?;
        let router = build_router(state).await?;

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("genvideo-service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT/SIGTERM, then drain in-flight requests.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
