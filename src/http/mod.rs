//! HTTP boundary.
//!
//! Routes:
//! - `GET /health`: liveness
//! - `POST /hook`: receive a webhook (multipart `payload` field or raw JSON body)
//! - `GET /hook`, `GET /activity`: list recorded deliveries, oldest first
//!
//! Every request gets a random correlation id. It is attached to the request's
//! tracing span, recorded with the activity entry, and echoed back in the
//! `x-request-id` response header.

pub mod error;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::core::{Attachment, Dispatcher, Evaluation};
use crate::domain::ActivityLogEntry;

pub use error::{ApiError, ApiResult, FailureResponse};

/// Multipart field carrying the JSON payload
pub const PAYLOAD_FIELD: &str = "payload";

/// Multipart field carrying an optional thumbnail
pub const THUMB_FIELD: &str = "thumb";

/// Response header echoing the request's correlation id
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id assigned to each request by the middleware
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[derive(Clone)]
struct ServerState {
    dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}

/// Result of a `POST /hook`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    pub msg: String,
    pub request_id: String,
    pub matched: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

/// Build the application router
pub fn router(dispatcher: Arc<Dispatcher>, max_body_bytes: usize) -> Router {
    let state = ServerState { dispatcher };

    Router::new()
        .route("/health", get(handle_health_check))
        .route("/hook", get(handle_get_activity).post(handle_webhook))
        .route("/activity", get(handle_get_activity))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(from_fn(request_context))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_body_bytes: usize,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(dispatcher, max_body_bytes);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
}

/// Assign a request id, run the request inside its span and log the outcome
async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let uri = request.uri().to_string();
    let method = request.method().clone();
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let span = info_span!("request", request_id = %request_id);
    let begin = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            %method,
            uri = %uri,
            ip = %ip,
            response_code = response.status().as_u16(),
            latency_ms = begin.elapsed().as_millis() as u64,
            "Handled request"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

async fn handle_health_check() -> Json<MessageResponse> {
    Json(MessageResponse {
        msg: "Ok".to_string(),
    })
}

async fn handle_get_activity(State(state): State<ServerState>) -> Json<Vec<ActivityLogEntry>> {
    Json(state.dispatcher.activity().await)
}

async fn handle_webhook(
    State(state): State<ServerState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    request: Request,
) -> ApiResult<Response> {
    let (payload, attachment) = if is_multipart(&request) {
        read_multipart(request).await?
    } else {
        let body = Bytes::from_request(request, &()).await.map_err(|rejection| {
            ApiError::Request {
                status: rejection.status(),
                message: rejection.body_text(),
            }
        })?;
        (body.to_vec(), None)
    };

    // Recording and trigger actions run to completion even if the client goes away
    let dispatcher = Arc::clone(&state.dispatcher);
    let id = request_id.clone();
    let dispatch = tokio::spawn(
        async move { dispatcher.handle(&id, &payload, attachment).await }.in_current_span(),
    );

    let evaluation = dispatch.await.map_err(|e| ApiError::Request {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("dispatch task failed: {}", e),
    })??;

    Ok(hook_response(request_id, evaluation))
}

fn hook_response(request_id: String, evaluation: Evaluation) -> Response {
    let status = if evaluation.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    let msg = if evaluation.is_success() {
        "Ok".to_string()
    } else {
        "One or more actions failed".to_string()
    };

    let body = HookResponse {
        msg,
        request_id,
        matched: evaluation.matched,
        failures: evaluation.failures.iter().map(ToString::to_string).collect(),
    };

    (status, Json(body)).into_response()
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Pull the `payload` field and an optional `thumb` file out of a multipart body.
///
/// Only the first `payload` field counts.
async fn read_multipart(request: Request) -> ApiResult<(Vec<u8>, Option<Attachment>)> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| ApiError::Request {
            status: rejection.status(),
            message: rejection.body_text(),
        })?;

    let mut payload = None;
    let mut attachment = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(PAYLOAD_FIELD) => {
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if payload.is_none() {
                    payload = Some(bytes.to_vec());
                } else {
                    debug!("Ignoring repeated payload field");
                }
            }
            Some(THUMB_FIELD) => {
                let file_name = field.file_name().map(str::to_owned);
                let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
                if !bytes.is_empty() {
                    attachment = Some(Attachment { file_name, bytes });
                }
            }
            _ => {}
        }
    }

    let payload = payload
        .ok_or_else(|| ApiError::bad_request(format!("missing multipart field '{}'", PAYLOAD_FIELD)))?;
    Ok((payload, attachment))
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Request {
        status: error.status(),
        message: error.body_text(),
    }
}
