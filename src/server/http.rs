//! Shared HTTP plumbing
//!
//! Accept loop and JSON helpers used by both servers. Uses hyper http1
//! with TokioIo for async handling.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::types::ColloquyError;

/// All handlers produce fully-buffered JSON responses
pub type HttpResponse = Response<Full<Bytes>>;

/// Accept connections forever, dispatching each request to `handler`.
/// Callers spawn this and own the task handle.
pub async fn serve<S, H, Fut>(listener: TcpListener, state: Arc<S>, handler: H)
where
    S: Send + Sync + 'static,
    H: Fn(Arc<S>, Request<Incoming>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                let handler = handler.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        let handler = handler.clone();
                        async move {
                            let method = req.method().clone();
                            let path = req.uri().path().to_string();
                            let start = Instant::now();
                            let response = handler(state, req).await;
                            info!(
                                "{} {} {} {}ms",
                                method,
                                path,
                                response.status().as_u16(),
                                start.elapsed().as_millis()
                            );
                            Ok::<_, Infallible>(response)
                        }
                    });
                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Serialize a body as a JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    let body = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// `{"error": message}` with the given status.
pub fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    json_response(status, &json!({ "error": message }))
}

pub fn not_found_response() -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

/// Generic 500; details stay in the logs, never in the body.
pub fn internal_error_response() -> HttpResponse {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Parse a JSON request body, answering 400 on any failure.
pub async fn read_json<T: DeserializeOwned>(
    req: Request<Incoming>,
) -> std::result::Result<T, HttpResponse> {
    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Could not read request body",
            ));
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| {
        debug!("Malformed request body: {}", e);
        error_response(StatusCode::BAD_REQUEST, "Malformed request body")
    })
}

/// Translate a gate decision into its wire form. `None` means admitted.
///
/// A missing credential answers 402 with the encoded payment request in the
/// `X-Cashu` response header, matching what existing clients decode.
pub fn admission_to_response(admission: crate::payment::Admission) -> Option<HttpResponse> {
    use crate::payment::Admission;

    match admission {
        Admission::Admit => None,
        Admission::PaymentRequired {
            encoded_request,
            amount,
            unit,
        } => {
            let body = serde_json::to_string(&json!({
                "error": "Payment required",
                "amount": amount,
                "unit": unit,
            }))
            .unwrap_or_default();
            Some(
                Response::builder()
                    .status(StatusCode::PAYMENT_REQUIRED)
                    .header("Content-Type", "application/json")
                    .header("X-Cashu", encoded_request)
                    .body(Full::new(Bytes::from(body)))
                    .unwrap(),
            )
        }
        Admission::InsufficientPayment {
            required,
            received,
            unit,
        } => Some(json_response(
            StatusCode::PAYMENT_REQUIRED,
            &json!({
                "error": "Insufficient payment",
                "required": required,
                "received": received,
                "unit": unit,
            }),
        )),
        Admission::InvalidCredential => Some(error_response(
            StatusCode::BAD_REQUEST,
            "Invalid cashu token",
        )),
        Admission::PaymentFailed { detail } => Some(error_response(
            StatusCode::BAD_REQUEST,
            &format!("Payment failed: {detail}"),
        )),
    }
}

/// Credential from the `X-Cashu` request header, if any.
pub fn credential_header(req: &Request<Incoming>) -> Option<String> {
    req.headers()
        .get("x-cashu")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Translate a component error into its boundary status code.
pub fn error_to_response(error: &ColloquyError) -> HttpResponse {
    match error {
        ColloquyError::NotFound(message) => error_response(StatusCode::NOT_FOUND, message),
        ColloquyError::Validation(message) => error_response(StatusCode::BAD_REQUEST, message),
        ColloquyError::InvalidCredential(_) => {
            error_response(StatusCode::BAD_REQUEST, "Invalid payment credential")
        }
        ColloquyError::PaymentFailed(message) => error_response(
            StatusCode::BAD_REQUEST,
            &format!("Payment failed: {message}"),
        ),
        other => {
            // Collaborator, persistence, IO: never leak internals
            error!("Request failed: {}", other);
            internal_error_response()
        }
    }
}
