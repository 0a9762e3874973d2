//! HTTP server implementation using Axum.

use crate::assistant::AnalysisOutcome;
use crate::config::ServerConfig;
use crate::language::Language;
use crate::registry::SessionSummary;
use crate::result::ExecutionResult;
use crate::service::{ExecuteOutcome, ExecuteRequest, UploadedFile};
use crate::state::AppState;
use axum::{
    extract::{
        multipart::MultipartRejection, DefaultBodyLimit, FromRequest, Multipart, Path, Request,
        State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Upper bound on files accepted by one execute request.
pub const MAX_UPLOAD_FILES: usize = 5;

/// Language used when a form omits one.
const DEFAULT_LANGUAGE: &str = "typescript";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexResponse {
    supported_languages: Vec<&'static str>,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    code: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    action: String,
}

#[derive(Deserialize)]
struct CleanupRequest {
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct CleanupResponse {
    success: bool,
    found: bool,
    message: String,
}

/// Build the router with all routes.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/execute", post(execute))
        .route("/analyze-code", post(analyze_code))
        .route("/cleanup", post(cleanup))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until it fails.
pub async fn run_server(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let app = router(state, config.max_upload_bytes);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        supported_languages: Language::ALL.iter().map(|l| l.as_str()).collect(),
    })
}

async fn health() -> &'static str {
    "OK"
}

async fn execute(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<ExecuteOutcome> {
    let form = match multipart {
        Ok(multipart) => read_execute_form(multipart).await,
        Err(rejection) => Err(FormError {
            session_id: None,
            message: rejection.body_text(),
        }),
    };

    match form {
        Ok(request) => Json(state.service.execute(request).await),
        Err(e) => {
            warn!(error = %e.message, "Rejected execute form");
            Json(ExecuteOutcome {
                session_id: e.session_id,
                result: ExecutionResult::failure(format!("Error: {}", e.message)),
                uploaded_files: Vec::new(),
            })
        }
    }
}

struct FormError {
    session_id: Option<String>,
    message: String,
}

async fn read_execute_form(mut multipart: Multipart) -> Result<ExecuteRequest, FormError> {
    let mut request = ExecuteRequest {
        language: DEFAULT_LANGUAGE.to_string(),
        ..ExecuteRequest::default()
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(FormError {
                    session_id: request.session_id,
                    message: e.body_text(),
                })
            }
        };
        let name = field.name().unwrap_or_default().to_string();

        let outcome = match name.as_str() {
            "language" => field.text().await.map(|v| {
                if !v.is_empty() {
                    request.language = v;
                }
            }),
            "code" => field.text().await.map(|v| request.code = v),
            "sessionId" => field.text().await.map(|v| request.session_id = Some(v)),
            "files" => {
                if request.files.len() == MAX_UPLOAD_FILES {
                    return Err(FormError {
                        session_id: request.session_id,
                        message: format!("at most {} files may be uploaded", MAX_UPLOAD_FILES),
                    });
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        let file = UploadedFile::new(file_name, bytes).map_err(|e| FormError {
                            session_id: request.session_id.clone(),
                            message: e.to_string(),
                        })?;
                        request.files.push(file);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            _ => Ok(()),
        };

        if let Err(e) = outcome {
            return Err(FormError {
                session_id: request.session_id,
                message: e.body_text(),
            });
        }
    }

    Ok(request)
}

/// Decode a JSON or url-encoded form body. The error is the rejection text.
async fn read_body<T>(request: Request) -> Result<T, String>
where
    T: DeserializeOwned + Send + 'static,
{
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        Form::<T>::from_request(request, &())
            .await
            .map(|Form(body)| body)
            .map_err(|rejection| rejection.body_text())
    } else {
        Json::<T>::from_request(request, &())
            .await
            .map(|Json(body)| body)
            .map_err(|rejection| rejection.body_text())
    }
}

async fn analyze_code(State(state): State<AppState>, request: Request) -> Json<AnalysisOutcome> {
    let req: AnalyzeRequest = match read_body(request).await {
        Ok(req) => req,
        Err(message) => {
            warn!(error = %message, "Rejected analyze request");
            return Json(AnalysisOutcome {
                success: false,
                result: None,
                message: Some(format!("Invalid request: {}", message)),
            });
        }
    };

    Json(
        state
            .assistant
            .analyze_outcome(&req.code, &req.language, &req.action)
            .await,
    )
}

async fn cleanup(State(state): State<AppState>, request: Request) -> Json<CleanupResponse> {
    let req: CleanupRequest = match read_body(request).await {
        Ok(req) => req,
        Err(message) => {
            warn!(error = %message, "Rejected cleanup request");
            return Json(CleanupResponse {
                success: false,
                found: false,
                message: format!("Invalid request: {}", message),
            });
        }
    };

    let outcome = state
        .service
        .cleanup(&req.session_id.unwrap_or_default())
        .await;
    Json(CleanupResponse {
        success: outcome.found,
        found: outcome.found,
        message: outcome.message,
    })
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.service.registry().list().await)
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, StatusCode> {
    state
        .service
        .registry()
        .summary(&id)
        .await
        .map(Json)
        .map_err(|_| StatusCode::NOT_FOUND)
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.service.cleanup(&id).await.found {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
