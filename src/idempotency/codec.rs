use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// An HTTP response whose body has been fully drained into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Builds a response with a JSON body and matching content type.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status, headers, body)
    }

    /// Drains a streaming response body into memory.
    pub async fn from_response(response: Response) -> Result<Self> {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to buffer response body: {}", e)))?;

        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// One stored header. Values that are not UTF-8 are kept as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedHeader {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub binary: bool,
}

/// Body of a cached response, tagged by the encoding that was used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum CachedBody {
    Json(serde_json::Value),
    Text(String),
    Base64(String),
}

/// Storable form of a completed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<CachedHeader>,
    pub body: CachedBody,
}

impl CachedResponse {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize cached response: {}", e)))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| AppError::Decode(e.to_string()))
    }
}

/// Converts a buffered response into its storable record.
pub fn encode(response: &BufferedResponse) -> CachedResponse {
    let headers = response
        .headers
        .iter()
        .map(|(name, value)| match std::str::from_utf8(value.as_bytes()) {
            Ok(text) => CachedHeader {
                name: name.as_str().to_string(),
                value: text.to_string(),
                binary: false,
            },
            Err(_) => CachedHeader {
                name: name.as_str().to_string(),
                value: BASE64.encode(value.as_bytes()),
                binary: true,
            },
        })
        .collect();

    CachedResponse {
        status: response.status.as_u16(),
        headers,
        body: encode_body(&response.body),
    }
}

fn encode_body(body: &[u8]) -> CachedBody {
    let text = match std::str::from_utf8(body) {
        Ok(text) => text,
        Err(_) => return CachedBody::Base64(BASE64.encode(body)),
    };

    // Only keep the structured form when it serializes back to the same bytes.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if serde_json::to_vec(&value).map(|b| b == body).unwrap_or(false) {
            return CachedBody::Json(value);
        }
    }

    CachedBody::Text(text.to_string())
}

/// Rebuilds the response described by a stored record.
pub fn decode(record: &CachedResponse) -> Result<BufferedResponse> {
    let status = StatusCode::from_u16(record.status)
        .map_err(|_| AppError::Decode(format!("invalid status code {}", record.status)))?;

    let mut headers = HeaderMap::with_capacity(record.headers.len());
    for header in &record.headers {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| AppError::Decode(format!("invalid header name {:?}: {}", header.name, e)))?;
        let raw = if header.binary {
            BASE64
                .decode(&header.value)
                .map_err(|e| AppError::Decode(format!("invalid binary header {}: {}", header.name, e)))?
        } else {
            header.value.clone().into_bytes()
        };
        let value = HeaderValue::from_bytes(&raw)
            .map_err(|e| AppError::Decode(format!("invalid header value for {}: {}", header.name, e)))?;
        headers.append(name, value);
    }

    let body = match &record.body {
        CachedBody::Json(value) => serde_json::to_vec(value)
            .map_err(|e| AppError::Decode(e.to_string()))?,
        CachedBody::Text(text) => text.clone().into_bytes(),
        CachedBody::Base64(encoded) => BASE64
            .decode(encoded)
            .map_err(|e| AppError::Decode(format!("invalid base64 body: {}", e)))?,
    };

    Ok(BufferedResponse::new(status, headers, body))
}
