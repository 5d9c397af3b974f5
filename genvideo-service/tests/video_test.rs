mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{Duration, Utc};
use common::{MultipartForm, TestApp, VOICE_DURATION};
use genvideo_service::{
    models::NewVideo,
    services::{UserRepository, VideoRepository},
};
use serde_json::json;

async fn seed_videos(app: &TestApp, user_id: i64, count: usize) -> Vec<String> {
    let mut names = Vec::new();
    for i in 0..count {
        let filename = format!("video_20250101_00000{}_abcdef0{}.mp4", i, i);
        app.store
            .insert_video_within_limit(
                &NewVideo {
                    user_id,
                    filename: filename.clone(),
                    duration: 5.0,
                },
                100,
            )
            .await
            .unwrap()
            .unwrap();
        names.push(filename);
    }
    names
}

#[tokio::test]
async fn test_generate_video_duration_matches_voice() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("maker@example.com").await;

    let form = MultipartForm::complete()
        .text("minTime", "1")
        .text("maxTime", "2")
        .text("transitionType", "slide")
        .text("textOverlays", "Hello")
        .text("textOverlays", "");
    let (status, body) = app.generate(&token, &form).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "Video generated successfully");
    assert_eq!(body["duration"], VOICE_DURATION);
    assert_eq!(body["videoCount"], 1);
    assert_eq!(body["limit"], 10);

    let filename = body["filename"].as_str().unwrap();
    assert!(filename.starts_with("video_") && filename.ends_with(".mp4"));
    assert_eq!(body["videoUrl"], format!("/video/{}", filename));
    assert!(app
        .output_dir
        .join(format!("user_{}", user_id))
        .join(filename)
        .exists());

    let stored = app
        .store
        .find_video(user_id, filename)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.duration, VOICE_DURATION);

    let jobs = app.renderer.jobs();
    assert_eq!(jobs.len(), 1);
    let total: f64 = jobs[0].slides.iter().map(|s| s.duration).sum();
    assert!((total - VOICE_DURATION).abs() < 1e-6);
    assert!(jobs[0]
        .slides
        .iter()
        .all(|s| s.duration <= 2.0 + 1e-9 && s.image_index < 2));
    assert_eq!(jobs[0].slides[0].caption.as_deref(), Some("Hello"));
    assert_eq!(jobs[0].slides[1].caption, None);

    // Scratch directories are removed after the request
    let leftovers = std::fs::read_dir(&app.work_dir).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_generate_video_missing_files() {
    let app = TestApp::spawn().await;
    let (token, _) = app.signup("partial@example.com").await;

    let form = MultipartForm::new()
        .file("images", "a.jpg", b"a")
        .file("backgroundSound", "bg.mp3", b"bg");
    let (status, body) = app.generate(&token, &form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Voice file is required");

    let form = MultipartForm::new()
        .file("voice", "v.mp3", b"v")
        .file("backgroundSound", "bg.mp3", b"bg");
    let (status, _) = app.generate(&token, &form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_video_invalid_options() {
    let app = TestApp::spawn().await;
    let (token, _) = app.signup("options@example.com").await;

    for (name, value) in [
        ("minTime", "0"),
        ("maxTime", "1"),
        ("transitionType", "wipe"),
        ("voiceVolume", "-0.5"),
    ] {
        let form = MultipartForm::complete().text(name, value);
        let (status, body) = app.generate(&token, &form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}={} gave {}", name, value, body);
    }

    // Slides shorter than one frame at 24 fps
    let form = MultipartForm::complete()
        .text("minTime", "0.001")
        .text("maxTime", "0.001");
    let (status, body) = app.generate(&token, &form).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("one frame"), "{}", body);

    assert!(app.renderer.jobs().is_empty());
}

#[tokio::test]
async fn test_video_cap_blocks_generation() {
    let app = TestApp::spawn_with(|config| config.limits.max_videos_per_user = 1).await;
    let (token, user_id) = app.signup("capped@example.com").await;

    let (status, _) = app.generate(&token, &MultipartForm::complete()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.generate(&token, &MultipartForm::complete()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Video limit reached");
    assert_eq!(body["videoCount"], 1);
    assert_eq!(body["limit"], 1);
    assert!(body["message"].as_str().unwrap().contains("maximum limit of 1 videos"));

    assert_eq!(app.store.count_videos(user_id).await.unwrap(), 1);
    assert_eq!(app.renderer.jobs().len(), 1);

    let (status, body) = app.get("/check_video_limit", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "count": 1, "limit": 1, "canGenerate": false }));
}

#[tokio::test]
async fn test_expired_subscription_cannot_generate() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("lapsed@example.com").await;

    let yesterday = Utc::now().date_naive() - Duration::days(1);
    app.store
        .update_subscription(user_id, "free", yesterday)
        .await
        .unwrap();

    let (status, body) = app.generate(&token, &MultipartForm::complete()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["subscription_expired"], true);
    assert_eq!(body["subscription_expiry"], yesterday.to_string());
    assert!(app.renderer.jobs().is_empty());

    // Other endpoints stay open
    let (status, _) = app.get("/get_videos", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_videos_pagination() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("lister@example.com").await;
    seed_videos(&app, user_id, 3).await;

    let (status, body) = app.get("/get_videos?page=1&limit=2", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["hasMore"], true);
    assert_eq!(body["videos"].as_array().unwrap().len(), 2);

    let first = &body["videos"][0];
    assert!(first["videoId"].as_str().unwrap().ends_with(".mp4"));
    assert_eq!(
        first["url"],
        format!("/video/{}", first["videoId"].as_str().unwrap())
    );
    assert_eq!(
        first["title"],
        first["videoId"].as_str().unwrap().trim_end_matches(".mp4")
    );

    let (_, body) = app.get("/get_videos?page=2&limit=2", Some(&token)).await;
    assert_eq!(body["videos"].as_array().unwrap().len(), 1);
    assert_eq!(body["hasMore"], false);
}

#[tokio::test]
async fn test_users_cannot_touch_each_others_videos() {
    let app = TestApp::spawn().await;
    let (owner_token, _) = app.signup("owner@example.com").await;
    let (other_token, _) = app.signup("other@example.com").await;

    let (_, body) = app.generate(&owner_token, &MultipartForm::complete()).await;
    let filename = body["filename"].as_str().unwrap().to_string();

    let (status, _) = app
        .get(&format!("/video/{}", filename), Some(&other_token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .json_request(
            "DELETE",
            "/delete_video",
            json!({ "videoId": filename }),
            Some(&other_token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Video not found or unauthorized");

    let (_, body) = app.get("/get_videos", Some(&other_token)).await;
    assert_eq!(body["total"], 0);

    let (_, body) = app.get("/get_videos", Some(&owner_token)).await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_serve_video_to_owner() {
    let app = TestApp::spawn().await;
    let (token, _) = app.signup("viewer@example.com").await;

    let (_, body) = app.generate(&token, &MultipartForm::complete()).await;
    let filename = body["filename"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri(format!("/video/{}", filename))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");

    // `<video src>` cannot set headers, so the token may come in the query
    let request = Request::builder()
        .uri(format!("/video/{}?token={}", filename, token))
        .header(header::RANGE, "bytes=0-3")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

    let (status, _) = app.get(&format!("/video/{}", filename), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_serve_video_rejects_unsafe_names() {
    let app = TestApp::spawn().await;
    let (token, _) = app.signup("sneaky@example.com").await;

    let (status, _) = app.get("/video/.hidden.mp4", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/video/..%2Fsecret.mp4", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_video() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("deleter@example.com").await;

    let (_, body) = app.generate(&token, &MultipartForm::complete()).await;
    let filename = body["filename"].as_str().unwrap().to_string();
    let path = app
        .output_dir
        .join(format!("user_{}", user_id))
        .join(&filename);
    assert!(path.exists());

    let (status, _) = app
        .json_request("DELETE", "/delete_video", json!({}), Some(&token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json_request(
            "DELETE",
            "/delete_video",
            json!({ "filename": filename }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!path.exists());
    assert_eq!(app.store.count_videos(user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_video_with_missing_file() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("orphan@example.com").await;
    let names = seed_videos(&app, user_id, 1).await;

    let (status, _) = app
        .json_request(
            "DELETE",
            "/delete_video",
            json!({ "videoId": names[0] }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_video_keeps_row_when_file_removal_fails() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("stuck@example.com").await;
    let names = seed_videos(&app, user_id, 1).await;

    // A directory in place of the file makes the removal fail
    let path = app
        .output_dir
        .join(format!("user_{}", user_id))
        .join(&names[0]);
    std::fs::create_dir_all(path.join("nested")).unwrap();

    let (status, _) = app
        .json_request(
            "DELETE",
            "/delete_video",
            json!({ "filename": names[0] }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app
        .store
        .find_video(user_id, &names[0])
        .await
        .unwrap()
        .is_some());
    assert!(path.exists());
}

#[tokio::test]
async fn test_clear_cache() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("clearer@example.com").await;

    app.generate(&token, &MultipartForm::complete()).await;
    app.generate(&token, &MultipartForm::complete()).await;

    let (status, body) = app.post_json("/clear_cache", json!({}), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);
    assert_eq!(app.store.count_videos(user_id).await.unwrap(), 0);

    let remaining = std::fs::read_dir(app.output_dir.join(format!("user_{}", user_id)))
        .unwrap()
        .count();
    assert_eq!(remaining, 0);
}
