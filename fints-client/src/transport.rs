//! HTTP transport. FinTS messages travel as base64 over the ISO-8859-1
//! encoding of the wire text, POSTed as a plain-text body.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::ClientError;

/// One request/response round trip with the bank. The production
/// implementation is [`HttpTransport`]; tests script responses instead.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, url: &str, message: &str) -> Result<String, ClientError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exchange for HttpTransport {
    async fn exchange(&self, url: &str, message: &str) -> Result<String, ClientError> {
        debug!(url, "sending request to bank endpoint");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/plain")
            .body(encode_payload(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(status.as_u16()));
        }

        let body = response.text().await?;
        decode_payload(&body)
    }
}

/// UTF-8 wire text to its transmitted form: ISO-8859-1 bytes, base64.
pub fn encode_payload(message: &str) -> String {
    let mut latin1 = vec![0u8; message.len()];
    let written = encoding_rs::mem::convert_utf8_to_latin1_lossy(message.as_bytes(), &mut latin1);
    latin1.truncate(written);
    BASE64.encode(&latin1)
}

/// Transmitted form back to UTF-8 wire text. Whitespace padding around the
/// base64 body is tolerated.
pub fn decode_payload(body: &str) -> Result<String, ClientError> {
    let raw = BASE64.decode(body.trim().as_bytes())?;
    let mut utf8 = vec![0u8; raw.len() * 2];
    let written = encoding_rs::mem::convert_latin1_to_utf8(&raw, &mut utf8);
    utf8.truncate(written);
    Ok(String::from_utf8_lossy(&utf8).into_owned())
}
