//! Web API Server
//!
//! HTTP boundary for the explanation service.
//!
//! ## Endpoints
//!
//! - `POST /explain`: Explain a topic at a complexity tier (JSON)
//! - `GET /`: Service info: model, endpoints, complexity tiers
//! - `GET /health`: Health check, including provider credential status
//! - `GET /metrics`: Prometheus metrics
//!
//! ## Status codes
//!
//! | Outcome                     | Status |
//! |-----------------------------|--------|
//! | Explanation generated       | 200    |
//! | Invalid or unparsable input | 400    |
//! | Body over the size cap      | 413    |
//! | Provider failure            | 502    |

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancel::cancel_pair;
use crate::config::ServerSection;
use crate::orchestrator::{
    ExplainError, ExplanationOrchestrator, ExplanationRequest, InputField,
    UPSTREAM_FAILURE_MESSAGE,
};
use crate::OrchestratorError;

const REQUEST_ID_HEADER: &str = "x-request-id";

// ============================================================================
// Types
// ============================================================================

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<ExplanationOrchestrator>,
    max_request_size: usize,
    cors_allowed_origins: Vec<String>,
}

impl AppState {
    /// State for a router serving `orchestrator` under `config`'s boundary policy.
    pub fn new(orchestrator: Arc<ExplanationOrchestrator>, config: &ServerSection) -> Self {
        Self {
            orchestrator,
            max_request_size: config.max_request_size,
            cors_allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

/// Request identifier assigned by [`request_id_middleware`].
#[derive(Debug, Clone)]
struct RequestId(String);

/// JSON body for 400 and 502 responses.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed: Option<Vec<&'static str>>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            field: None,
            allowed: None,
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Build the router with all routes and middleware applied.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_allowed_origins);
    let max_request_size = state.max_request_size;

    Router::new()
        .route("/", get(info_handler))
        .route("/explain", post(explain_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(middleware::from_fn_with_state(
            max_request_size,
            body_size_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// Start the web API server.
///
/// Binds to `config.host:config.port` and serves until `shutdown` resolves;
/// in-flight requests are allowed to finish.
///
/// # Errors
///
/// Returns [`OrchestratorError::Server`] if the address cannot be bound or
/// the server fails.
pub async fn start_server(
    config: &ServerSection,
    orchestrator: Arc<ExplanationOrchestrator>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), OrchestratorError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(OrchestratorError::Server)?;

    info!(addr = %addr, "Web API ready on http://{}", addr);
    serve(listener, build_router(AppState::new(orchestrator, config)), shutdown).await
}

/// Serve `router` on an already-bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`OrchestratorError::Server`] if the server fails.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), OrchestratorError> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(OrchestratorError::Server)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
}

// ============================================================================
// Middleware
// ============================================================================

/// Adds a unique `X-Request-ID` header to every response.
///
/// If the client sends an `X-Request-ID` header, it is preserved; otherwise
/// a new UUID v4 is generated. The id is also made available to handlers.
async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Rejects requests whose `Content-Length` exceeds `max_size` with 413.
async fn body_size_middleware(
    State(max_size): State<usize>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(content_length) = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if content_length > max_size {
            return AppError::PayloadTooLarge.into_response();
        }
    }

    next.run(req).await
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /explain`: Generate an explanation.
///
/// The orchestration runs in its own task holding a cancellation signal; the
/// matching handle lives in this future, so a client that disconnects
/// abandons the provider call.
async fn explain_handler(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(value) = body.map_err(AppError::from_rejection)?;
    let request = parse_explain_body(&value)?;

    let span = info_span!(
        "explain",
        request_id = %request_id,
        complexity = %request.complexity,
    );
    let (_cancel_guard, signal) = cancel_pair();
    let orchestrator = Arc::clone(&state.orchestrator);
    let task = tokio::spawn(
        async move { orchestrator.explain(request, signal).await }.instrument(span),
    );

    match task.await {
        Ok(Ok(result)) => Ok(Json(result).into_response()),
        Ok(Err(e)) => Err(AppError::Explain(e)),
        Err(join_err) => {
            error!(request_id = %request_id, error = %join_err, "explain task failed");
            Err(AppError::Internal)
        }
    }
}

/// Pull `topic` and `complexity` out of a JSON body, naming the offending
/// field when one is missing or not a string.
fn parse_explain_body(value: &serde_json::Value) -> Result<ExplanationRequest, AppError> {
    let Some(object) = value.as_object() else {
        return Err(AppError::MalformedBody {
            message: "Request body must be a JSON object with 'topic' and 'complexity'"
                .to_string(),
            field: None,
        });
    };

    let string_field = |field: InputField| -> Result<String, AppError> {
        match object.get(field.as_str()) {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(AppError::MalformedBody {
                message: format!("'{}' must be a string", field.as_str()),
                field: Some(field),
            }),
            None => Err(AppError::MalformedBody {
                message: format!("'{}' is required", field.as_str()),
                field: Some(field),
            }),
        }
    };

    let topic = string_field(InputField::Topic)?;
    let complexity = string_field(InputField::Complexity)?;
    Ok(ExplanationRequest::new(topic, complexity))
}

/// `GET /`: Static service description.
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let orchestrator = &state.orchestrator;
    Json(serde_json::json!({
        "service": "ELI5 Explanation Service",
        "version": env!("CARGO_PKG_VERSION"),
        "model": orchestrator.settings().model,
        "provider": orchestrator.provider().name(),
        "endpoints": {
            "/": "GET - Service information",
            "/explain": "POST - Explain a topic at a complexity tier",
            "/health": "GET - Health check",
            "/metrics": "GET - Prometheus metrics",
        },
        "complexities": orchestrator.registry().allowed_ids(),
    }))
}

/// `GET /health`: Health check endpoint.
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let orchestrator = &state.orchestrator;
    let api = if orchestrator.provider().is_configured() {
        "connected"
    } else {
        "no API key"
    };
    Json(serde_json::json!({
        "status": "healthy",
        "api": api,
        "model": orchestrator.settings().model,
    }))
}

/// `GET /metrics`: Prometheus metrics endpoint.
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

// ============================================================================
// Error Type
// ============================================================================

/// Application-level errors returned by API handlers.
///
/// Each variant maps to an HTTP status code and a JSON error body.
#[derive(Debug)]
enum AppError {
    /// Validation or upstream failure from the orchestrator.
    Explain(ExplainError),
    /// The body was not a usable JSON object.
    MalformedBody {
        message: String,
        field: Option<InputField>,
    },
    /// The body exceeded the configured size cap.
    PayloadTooLarge,
    /// The orchestration task panicked or was aborted.
    Internal,
}

impl AppError {
    fn from_rejection(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge;
        }
        AppError::MalformedBody {
            message: format!("Invalid JSON body: {}", rejection.body_text()),
            field: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Explain(ExplainError::InvalidInput {
                field,
                message,
                allowed,
            }) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    field: Some(field.as_str()),
                    allowed,
                    ..ErrorBody::new(message)
                },
            ),
            AppError::Explain(ExplainError::UpstreamFailure(_)) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody::new(UPSTREAM_FAILURE_MESSAGE),
            ),
            AppError::MalformedBody { message, field } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    field: field.map(InputField::as_str),
                    ..ErrorBody::new(message)
                },
            ),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody::new("Request body too large"),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Internal server error"),
            ),
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
