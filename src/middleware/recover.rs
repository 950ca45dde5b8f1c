use axum::response::{IntoResponse, Response};
use std::any::Any;

use crate::error::ApiError;

/// Panic handler for `CatchPanicLayer::custom`. The panic aborts only the
/// request that raised it; the client gets the generic 500 envelope and the
/// connection is closed.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError::fault(format!("panic while handling request: {}", detail)).into_response()
}
