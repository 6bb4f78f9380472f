use axum::{
    body::Body,
    extract::{multipart::Field, DefaultBodyLimit, FromRequestParts, Multipart, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use minijinja::context;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt; // For oneshot
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::core::{hash_file, SourceVideo};
use crate::agent::health::check_dependencies;
use crate::agent::intent::Intent;
use crate::agent::previews::PreviewKind;
use crate::agent::production_tools::partial_path;
use crate::agent::source_tools::{has_extension, sanitize_filename, ALLOWED_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::auth::{clear_session_cookie, session_cookie, session_id_from_headers, AuthError};
use crate::error::AppError;
use crate::state::{ActiveVideo, AppState, Session};

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TrimForm {
    pub path: String,
    pub start: u32,
    pub end: u32,
}

#[derive(Deserialize)]
pub struct VoiceForm {
    pub text: String,
}

#[derive(Deserialize)]
pub struct ChatForm {
    pub prompt: String,
}

/// Snapshot of the caller's session; missing or unknown cookies redirect to `/login`.
pub struct CurrentSession(pub Session);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = session_id_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        state
            .sessions
            .touch(&id)
            .map(CurrentSession)
            .ok_or(AppError::Unauthorized)
    }
}

pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_mb * 1024 * 1024;

    Router::new()
        .route("/", get(index))
        .route("/register", get(register_form).post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard).post(upload_video))
        .route("/trim", post(trim))
        .route("/voice", post(voice))
        .route("/chat", post(chat))
        .route("/media/:area/:session/:file", get(media))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let port = state.config.port;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("[SERVER] PromptCut running on http://127.0.0.1:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("[SERVER] Shutdown signal received");
        })
        .await?;
    Ok(())
}

// ─── Pages ────────────────────────────────────────────────────────────────────

async fn index(
    State(state): State<AppState>,
    session: Option<CurrentSession>,
) -> Result<Html<String>, AppError> {
    let username = session.map(|CurrentSession(s)| s.username);
    Ok(state.views.render("index.html", context! { username })?)
}

async fn register_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    Ok(state.views.render("register.html", context! {})?)
}

async fn register(
    State(state): State<AppState>,
    Form(form): Form<Credentials>,
) -> Result<Response, AppError> {
    match state.users.create_user(&form.username, &form.password).await {
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        Err(AuthError::Database(e)) => Err(e.into()),
        Err(AuthError::Hash(e)) => Err(AppError::Internal(e)),
        Err(e) => {
            let status = match e {
                AuthError::UsernameTaken(_) => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
            let page = state
                .views
                .render("register.html", context! { error => e.to_string() })?;
            Ok((status, page).into_response())
        }
    }
}

async fn login_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    Ok(state.views.render("login.html", context! {})?)
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<Credentials>,
) -> Result<Response, AppError> {
    match state.users.authenticate(&form.username, &form.password).await? {
        Some(user) => {
            let session = state.sessions.create(&user);
            info!("[AUTH] '{}' logged in (session {})", user.username, session.id);
            Ok((
                [(header::SET_COOKIE, session_cookie(&session.id))],
                Redirect::to("/dashboard"),
            )
                .into_response())
        }
        None => {
            warn!("[AUTH] Failed login for '{}'", form.username);
            let page = state
                .views
                .render("login.html", context! { error => "Invalid username or password." })?;
            Ok((StatusCode::UNAUTHORIZED, page).into_response())
        }
    }
}

async fn logout(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Response {
    if let Some(id) = session_id_from_headers(&headers) {
        if let Some(session) = state.sessions.remove(&id) {
            info!("[AUTH] '{}' logged out", session.username);
            state.discard_session_files(&id).await;
        }
    }
    ([(header::SET_COOKIE, clear_session_cookie())], Redirect::to("/")).into_response()
}

async fn dashboard(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Html<String>, AppError> {
    render_dashboard(&state, &session.id, None)
}

async fn upload_video(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    mut multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let mut message = "No video file received.".to_string();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("video") {
            continue;
        }
        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            break;
        }
        let filename = sanitize_filename(&original);
        if !has_extension(Path::new(&filename), VIDEO_EXTENSIONS) {
            message = format!("Unsupported file type: {}", filename);
            break;
        }

        let dir = state.upload_dir(&session.id);
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(&filename);

        // Stream into a scratch file so a failed or concurrent upload never
        // clobbers the video the session is editing.
        let partial = partial_path(&dest);
        let saved = match save_field(&mut field, &partial).await {
            Ok(()) => hash_file(&partial).await.map_err(AppError::from),
            Err(e) => Err(e),
        };
        let digest = match saved {
            Ok(digest) => digest,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                warn!("[SERVER] Upload of {} failed: {}", filename, e);
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, &dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        let source = SourceVideo {
            path: dest.clone(),
            digest,
        };

        info!("[SERVER] Saved upload {:?} ({})", dest, &source.digest[..12]);
        state.sessions.update(&session.id, |s| {
            s.active_video = Some(ActiveVideo {
                filename: filename.clone(),
                source,
            })
        });
        message = format!("Uploaded {}.", filename);
        break;
    }

    render_dashboard(&state, &session.id, Some(message))
}

async fn save_field(field: &mut Field<'_>, path: &Path) -> Result<(), AppError> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Trim one of this session's uploads and send the result as a download.
async fn trim(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Form(form): Form<TrimForm>,
) -> Result<Response, AppError> {
    let name = sanitize_filename(form.path.rsplit('/').next().unwrap_or_default());
    let real_path = state.upload_dir(&session.id).join(&name);
    if !real_path.is_file() {
        return Err(AppError::NotFound(format!("upload '{}'", name)));
    }

    let source = match session.active_video.filter(|v| v.source.path == real_path) {
        Some(video) => video.source,
        None => SourceVideo::from_path(&real_path).await?,
    };

    let intent = Intent::Trim {
        start: form.start,
        end: form.end,
    };
    let outputs = state.core.execute(&session.id, &intent, &source).await?;
    record_preview(&state, &session.id, PreviewKind::Trimmed, outputs.clone());

    let output = outputs
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("trim produced no output".to_string()))?;
    serve_download(&output).await
}

async fn voice(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Form(form): Form<VoiceForm>,
) -> Result<Html<String>, AppError> {
    let response = match state.core.voice_over(&session.id, &form.text).await {
        Ok(path) => {
            record_preview(&state, &session.id, PreviewKind::Voice, vec![path]);
            "Voiceover generated!".to_string()
        }
        Err(e) => {
            error!("[SERVER] Voice-over failed: {}", e);
            format!("Voiceover failed: {}", e)
        }
    };
    render_dashboard(&state, &session.id, Some(response))
}

async fn chat(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Form(form): Form<ChatForm>,
) -> Result<Html<String>, AppError> {
    info!("[SERVER] Command from '{}': {}", session.username, form.prompt);

    let source = session.active_video.as_ref().map(|v| &v.source);
    let reply = state.core.handle_prompt(&session.id, &form.prompt, source).await;

    state.sessions.update(&session.id, |s| {
        s.push_turn(&form.prompt, &reply.response);
        if let Some(kind) = reply.kind {
            s.previews.insert(kind, reply.outputs.clone());
        }
    });

    render_dashboard(&state, &session.id, Some(reply.response))
}

/// Serve a file from the caller's own upload or preview directory.
async fn media(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    axum::extract::Path((area, owner, file)): axum::extract::Path<(String, String, String)>,
    req: Request,
) -> Result<Response, AppError> {
    if owner != session.id {
        return Err(AppError::NotFound(file));
    }
    let base = match area.as_str() {
        "uploads" => state.config.uploads_dir(),
        "previews" => state.config.previews_dir(),
        _ => return Err(AppError::NotFound(area)),
    };
    if sanitize_filename(&file) != file || !has_extension(Path::new(&file), ALLOWED_EXTENSIONS) {
        return Err(AppError::BadRequest("Invalid file name".to_string()));
    }

    let path = base.join(&owner).join(&file);
    if !path.is_file() {
        return Err(AppError::NotFound(file));
    }

    match ServeFile::new(path).oneshot(req).await {
        Ok(res) => Ok(res.into_response()),
        Err(err) => Err(AppError::Internal(err.to_string())),
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let toolchain = check_dependencies(&state.config.tts_command).await;
    Json(json!({
        "status": "ok",
        "toolchain": toolchain,
        "encode_slots": {
            "available": state.core.limiter.available(),
            "capacity": state.core.limiter.capacity(),
        },
        "sessions": state.sessions.len(),
        "uptime_secs": state.health.uptime_secs(),
        "heartbeats": state.health.heartbeat_count(),
        "monitoring": state.health.is_running(),
    }))
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn record_preview(state: &AppState, session_id: &str, kind: PreviewKind, outputs: Vec<PathBuf>) {
    state.sessions.update(session_id, |s| {
        s.previews.insert(kind, outputs);
    });
}

fn preview_url(session_id: &str, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/media/previews/{}/{}", session_id, name)
}

fn render_dashboard(
    state: &AppState,
    session_id: &str,
    response: Option<String>,
) -> Result<Html<String>, AppError> {
    let session = state.sessions.get(session_id).ok_or(AppError::Unauthorized)?;

    let urls = |kind: PreviewKind| -> Vec<String> {
        session
            .existing_preview(kind)
            .map(|paths| paths.iter().map(|p| preview_url(session_id, p)).collect())
            .unwrap_or_default()
    };
    let first = |kind: PreviewKind| urls(kind).into_iter().next();

    let video = session.active_video.as_ref();
    let history: Vec<_> = session.history.iter().cloned().collect();

    let page = state.views.render(
        "dashboard.html",
        context! {
            username => session.username,
            video_name => video.map(|v| v.filename.clone()),
            video_url => video.map(|v| format!("/media/uploads/{}/{}", session_id, v.filename)),
            trimmed_exists => session.existing_preview(PreviewKind::Trimmed).is_some(),
            trimmed_url => first(PreviewKind::Trimmed),
            split_exists => session.existing_preview(PreviewKind::Split).is_some(),
            split_urls => urls(PreviewKind::Split),
            captioned_exists => session.existing_preview(PreviewKind::Captioned).is_some(),
            captioned_url => first(PreviewKind::Captioned),
            muted_exists => session.existing_preview(PreviewKind::Muted).is_some(),
            muted_url => first(PreviewKind::Muted),
            music_exists => session.existing_preview(PreviewKind::MusicAdded).is_some(),
            music_url => first(PreviewKind::MusicAdded),
            voice_exists => session.existing_preview(PreviewKind::Voice).is_some(),
            voice_url => first(PreviewKind::Voice),
            response => response,
            history => history,
        },
    )?;
    Ok(page)
}

async fn serve_download(path: &Path) -> Result<Response, AppError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download.mp4".to_string());

    let res = ServeFile::new(path)
        .oneshot(Request::new(Body::empty()))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut res = res.into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name)) {
        res.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_url() {
        assert_eq!(
            preview_url("abc", Path::new("static/previews/abc/muted-01.mp4")),
            "/media/previews/abc/muted-01.mp4"
        );
    }
}
