//! HTTP responses: one status line, three headers, the body, then the
//! connection is closed.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::BridgeError;

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";
pub const IMAGE_PNG: &str = "image/png";

/// A complete control-plane response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// `text/plain` response.
    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status, TEXT_PLAIN, body)
    }

    /// `200 OK` with body `OK`.
    pub fn ok() -> Self {
        Self::text(200, "OK")
    }

    /// `200` with a serialised JSON body.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(200, APPLICATION_JSON, body),
            Err(e) => Self::text(500, &format!("Failed to encode JSON: {e}")),
        }
    }

    /// `200` with PNG bytes.
    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(200, IMAGE_PNG, bytes)
    }

    pub fn bad_request() -> Self {
        Self::text(400, "Bad Request")
    }

    pub fn not_found() -> Self {
        Self::text(404, "Not Found")
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> &str {
        self.content_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Reason phrase for the status line.
    pub fn status_text(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }

    /// Status line and headers, including the terminating blank line.
    pub fn head(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.status_text(),
            self.content_type,
            self.body.len()
        )
    }

    /// Write head then body.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.head().as_bytes()).await?;
        if !self.body.is_empty() {
            writer.write_all(&self.body).await?;
        }
        writer.flush().await
    }
}

impl From<&BridgeError> for HttpResponse {
    fn from(e: &BridgeError) -> Self {
        match e {
            BridgeError::MalformedRequest(_) => Self::bad_request(),
            BridgeError::RouteNotFound(_) => Self::not_found(),
            BridgeError::NotConnected => Self::text(500, "RDP not connected"),
            other => Self::text(500, &other.to_string()),
        }
    }
}
