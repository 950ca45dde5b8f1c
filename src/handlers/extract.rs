use axum::{
    async_trait,
    body::to_bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use std::collections::HashMap;

use crate::error::ApiError;
use crate::validator::Validator;

pub const MAX_BODY_BYTES: usize = 1_048_576;

/// JSON request body. Exactly one value, at most 1 MiB; decoding failures
/// are reported as 400 with a message the client can act on.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|_| ApiError::bad_request(format!("body must not be larger than {} bytes", MAX_BODY_BYTES)))?;
        decode_json(&bytes).map(JsonBody)
    }
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("body must not be empty"));
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = T::deserialize(&mut de).map_err(describe_json_error)?;
    de.end()
        .map_err(|_| ApiError::bad_request("body must only contain a single JSON value"))?;
    Ok(value)
}

fn describe_json_error(err: serde_json::Error) -> ApiError {
    let message = match err.classify() {
        Category::Syntax => format!("body contains badly-formed JSON (at line {}, column {})", err.line(), err.column()),
        Category::Eof => "body contains badly-formed JSON".to_string(),
        Category::Data => {
            let detail = err.to_string();
            match detail.strip_prefix("unknown field ") {
                Some(rest) => {
                    let key = rest.split(',').next().unwrap_or(rest).trim_matches('`');
                    format!("body contains unknown key \"{}\"", key)
                }
                None => format!("body contains incorrect JSON type ({})", detail),
            }
        }
        Category::Io => err.to_string(),
    };
    ApiError::bad_request(message)
}

/// Query-string readers; a bad integer becomes a field error and the default
/// is used.
pub fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(s) if !s.is_empty() => s.clone(),
        _ => default.to_string(),
    }
}

pub fn read_csv(qs: &HashMap<String, String>, key: &str) -> Vec<String> {
    match qs.get(key) {
        Some(s) if !s.is_empty() => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

pub fn read_int(qs: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match qs.get(key) {
        Some(s) if !s.is_empty() => s.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
        _ => default,
    }
}
