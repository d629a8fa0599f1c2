use crate::auth::AuthService;
use crate::clips::ClipService;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::{Clip, InteractRequest, InteractResponse, MessageResponse, NewClip};
use crate::storage::StateStore;
use crate::upload::UploadStore;
use crate::user_models::Credentials;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub struct AppState {
    pub auth: AuthService,
    pub clips: ClipService,
    pub uploads: UploadStore,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: Arc<StateStore>, uploads: UploadStore, config: &AppConfig) -> Self {
        Self {
            auth: AuthService::new(store.clone(), config.auth.password_storage),
            clips: ClipService::new(store, config.public_base_url()),
            uploads,
            max_upload_bytes: config.upload.max_bytes,
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(state.uploads.dir());

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/clips", get(list_clips).post(create_clip))
        .route("/clips/:id/interact", post(interact))
        .route("/clips/:id", delete(delete_clip))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth.signup(payload.username, payload.password).await?;
    Ok(Json(MessageResponse::new("Signup successful")))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth.login(&payload.username, &payload.password).await?;
    Ok(Json(MessageResponse::new("Login successful")))
}

async fn list_clips(State(state): State<Arc<AppState>>) -> Json<Vec<Clip>> {
    Json(state.clips.list_clips().await)
}

/// Multipart fields: `clip` (file), `title`, `category`, `tags`, `uploader`.
/// The stored file is removed again if no clip ends up referencing it.
async fn create_clip(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Clip>, ApiError> {
    let mut stored_name = None;
    let meta = match read_clip_form(&state.uploads, &mut multipart, &mut stored_name).await {
        Ok(meta) => meta,
        Err(e) => {
            if let Some(stored) = &stored_name {
                state.uploads.remove(stored).await;
            }
            return Err(e);
        }
    };

    let Some(stored_name) = stored_name else {
        tracing::error!("Clip upload without a 'clip' file part");
        return Err(ApiError::internal("No clip file uploaded"));
    };

    match state.clips.create_clip(meta, &stored_name).await {
        Ok(clip) => Ok(Json(clip)),
        Err(e) => {
            state.uploads.remove(&stored_name).await;
            Err(e.into())
        }
    }
}

/// Reads every part of the form. A repeated `clip` part replaces the
/// earlier file, which is deleted.
async fn read_clip_form(
    uploads: &UploadStore,
    multipart: &mut Multipart,
    stored_name: &mut Option<String>,
) -> Result<NewClip, ApiError> {
    let mut meta = NewClip::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "clip" {
            let stored = uploads.store_field(field).await.map_err(|e| {
                tracing::error!(error = %format!("{:#}", e), "Upload failed");
                ApiError::internal("Failed to store uploaded file")
            })?;
            // Same name within one millisecond means the file was overwritten in place.
            if let Some(previous) = stored_name.replace(stored) {
                if stored_name.as_deref() != Some(previous.as_str()) {
                    uploads.remove(&previous).await;
                }
            }
            continue;
        }

        let target = match name.as_str() {
            "title" => &mut meta.title,
            "category" => &mut meta.category,
            "tags" => &mut meta.tags,
            "uploader" => &mut meta.uploader,
            _ => continue,
        };
        *target = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read field '{}': {}", name, e)))?;
    }

    Ok(meta)
}

async fn interact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<InteractRequest>,
) -> Result<Json<InteractResponse>, ApiError> {
    let counts = state
        .clips
        .interact(&id, payload.kind, payload.username.as_deref())
        .await?;

    Ok(Json(InteractResponse {
        success: true,
        views: counts.views,
        likes: counts.likes,
    }))
}

async fn delete_clip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.clips.delete_clip(&id).await?;
    Ok(Json(MessageResponse::new("Clip deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::{scratch_dir, FlakyBackend};
    use crate::storage::{MemoryBackend, StoreBackend};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use tower::ServiceExt;

    const BOUNDARY: &str = "clipboundary";

    struct TestApp<B = MemoryBackend> {
        router: Router,
        backend: Arc<B>,
        uploads: PathBuf,
    }

    enum FormPart<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a [u8]),
    }

    fn test_app() -> TestApp {
        test_app_with(MemoryBackend::new())
    }

    fn test_app_with<B: StoreBackend + 'static>(backend: B) -> TestApp<B> {
        let backend = Arc::new(backend);
        let store = Arc::new(StateStore::open(backend.clone()).unwrap());
        let uploads = scratch_dir("uploads");
        let state = AppState::new(store, UploadStore::new(&uploads), &AppConfig::default());

        TestApp {
            router: create_router(Arc::new(state)),
            backend,
            uploads,
        }
    }

    fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            match part {
                FormPart::Text(name, value) => body.extend_from_slice(
                    format!(
                        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                    )
                    .as_bytes(),
                ),
                FormPart::File(filename, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"clip\"; filename=\"{filename}\"\r\nContent-Type: video/mp4\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body
    }

    impl<B> TestApp<B> {
        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        async fn post_json(&self, uri: &str, body: Value) -> Response {
            self.send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }

        async fn get(&self, uri: &str) -> Response {
            self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
        }

        async fn delete(&self, uri: &str) -> Response {
            self.send(
                Request::builder()
                    .method("DELETE")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
        }

        async fn post_multipart(&self, body: Vec<u8>) -> Response {
            self.send(
                Request::builder()
                    .method("POST")
                    .uri("/clips")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
        }

        async fn upload(&self, title: &str, file: Option<(&str, &[u8])>) -> Response {
            let mut parts = vec![
                FormPart::Text("title", title),
                FormPart::Text("category", "sports"),
                FormPart::Text("tags", "football"),
                FormPart::Text("uploader", "alice"),
            ];
            if let Some((filename, bytes)) = file {
                parts.push(FormPart::File(filename, bytes));
            }
            let mut body = multipart_body(&parts);
            body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
            self.post_multipart(body).await
        }

        fn stored_files(&self) -> Vec<String> {
            std::fs::read_dir(&self.uploads)
                .unwrap()
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        }
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_signup_then_duplicate() {
        let app = test_app();
        let creds = json!({"username": "alice", "password": "pw"});

        let response = app.post_json("/signup", creds.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"message": "Signup successful"}));

        let response = app.post_json("/signup", creds).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "User already exists"}));
    }

    #[tokio::test]
    async fn test_login() {
        let app = test_app();
        app.post_json("/signup", json!({"username": "alice", "password": "pw"}))
            .await;

        let response = app
            .post_json("/login", json!({"username": "alice", "password": "pw"}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"message": "Login successful"}));

        let response = app
            .post_json("/login", json!({"username": "alice", "password": "nope"}))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid username or password"})
        );
    }

    #[tokio::test]
    async fn test_clip_lifecycle() {
        let app = test_app();

        let response = app.upload("Goal!", Some(("goal.mp4", &b"fake video"[..]))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let clip = body_json(response).await;
        assert_eq!(clip["title"], "Goal!");
        assert_eq!(clip["views"], 0);
        assert_eq!(clip["likes"], json!([]));
        let id = clip["id"].as_str().unwrap().to_string();
        let interact_uri = format!("/clips/{}/interact", id);

        let response = app.post_json(&interact_uri, json!({"type": "view"})).await;
        assert_eq!(
            body_json(response).await,
            json!({"success": true, "views": 1, "likes": 0})
        );

        let response = app
            .post_json(&interact_uri, json!({"type": "like", "username": "bob"}))
            .await;
        assert_eq!(
            body_json(response).await,
            json!({"success": true, "views": 1, "likes": 1})
        );
        let saved = app.backend.snapshot().unwrap();
        assert!(saved.clips[0].likes.contains("bob"));

        let response = app
            .post_json(&interact_uri, json!({"type": "like", "username": "bob"}))
            .await;
        assert_eq!(
            body_json(response).await,
            json!({"success": true, "views": 1, "likes": 0})
        );

        let response = app.delete(&format!("/clips/{}", id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"message": "Clip deleted"}));

        let clips = body_json(app.get("/clips").await).await;
        assert_eq!(clips, json!([]));
        assert!(app.backend.snapshot().unwrap().clips.is_empty());
    }

    #[tokio::test]
    async fn test_uploaded_file_is_served() {
        let app = test_app();

        let clip = body_json(app.upload("Save", Some(("save.mp4", &b"keeper"[..]))).await).await;
        let url = clip["videoURL"].as_str().unwrap();
        assert!(url.starts_with("http://localhost:3000/uploads/"));
        assert!(url.ends_with("-save.mp4"));

        let path = url.trim_start_matches("http://localhost:3000");
        let response = app.get(path).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"keeper");
    }

    #[tokio::test]
    async fn test_upload_without_file_fails() {
        let app = test_app();

        let response = app.upload("Nothing", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(app.get("/clips").await).await == json!([]));
    }

    #[tokio::test]
    async fn test_repeated_clip_part_keeps_only_last_file() {
        let app = test_app();

        let mut body = multipart_body(&[
            FormPart::Text("title", "Twice"),
            FormPart::File("first.mp4", b"first"),
            FormPart::Text("uploader", "alice"),
            FormPart::File("second.mp4", b"second"),
        ]);
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        let response = app.post_multipart(body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let clip = body_json(response).await;
        assert!(clip["videoURL"].as_str().unwrap().ends_with("-second.mp4"));
        let files = app.stored_files();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("-second.mp4"));
        assert_eq!(std::fs::read(app.uploads.join(&files[0])).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_truncated_form_removes_stored_file() {
        let app = test_app();

        let mut body = multipart_body(&[FormPart::File("cut.mp4", b"frames")]);
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nno end")
                .as_bytes(),
        );
        let response = app.post_multipart(body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(app.stored_files().is_empty());
        assert_eq!(body_json(app.get("/clips").await).await, json!([]));
    }

    #[tokio::test]
    async fn test_failed_save_removes_stored_file() {
        let app = test_app_with(FlakyBackend::default());
        app.backend.fail_saves(true);

        let response = app.upload("Lost", Some(("lost.mp4", &b"frames"[..]))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert!(app.stored_files().is_empty());
        assert_eq!(body_json(app.get("/clips").await).await, json!([]));
    }

    #[tokio::test]
    async fn test_interact_with_non_string_type_changes_nothing() {
        let app = test_app();
        let clip = body_json(app.upload("Odd", Some(("odd.mp4", &b"v"[..]))).await).await;
        let uri = format!("/clips/{}/interact", clip["id"].as_str().unwrap());

        for payload in [json!({"type": null}), json!({"type": 5, "username": "bob"}), json!({})] {
            let response = app.post_json(&uri, payload).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                body_json(response).await,
                json!({"success": true, "views": 0, "likes": 0})
            );
        }

        let saved = app.backend.snapshot().unwrap();
        assert_eq!(saved.clips[0].views, 0);
        assert!(saved.clips[0].likes.is_empty());
    }

    #[tokio::test]
    async fn test_interact_errors() {
        let app = test_app();

        let response = app
            .post_json("/clips/nonexistent/interact", json!({"type": "view"}))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"error": "Clip not found"}));

        let clip = body_json(app.upload("Goal!", Some(("goal.mp4", &b"v"[..]))).await).await;
        let uri = format!("/clips/{}/interact", clip["id"].as_str().unwrap());

        let response = app
            .post_json(&uri, json!({"type": "like", "username": ""}))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Must be logged in to like"})
        );

        let response = app.post_json(&uri, json!({"type": "share"})).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"success": true, "views": 0, "likes": 0})
        );
    }

    #[tokio::test]
    async fn test_delete_missing_clip_succeeds() {
        let app = test_app();

        let response = app.delete("/clips/12345").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"message": "Clip deleted"}));
    }
}
