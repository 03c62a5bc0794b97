//! OCR.space client for scanned loan documents

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::AiError;
use crate::config::Config;

pub const DEFAULT_OCRSPACE_API_URL: &str = "https://api.ocr.space/parse/image";

/// OCR engine 2 handles complex layouts such as tables in PDFs
const OCR_ENGINE: &str = "2";

/// PDF processing can take a while
const OCR_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct OcrSpaceConfig {
    pub api_key: String,
    pub api_url: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl OcrSpaceConfig {
    pub fn from_config(config: &Config) -> Option<Self> {
        config.ocrspace_api_key.as_ref().map(|api_key| Self {
            api_key: api_key.clone(),
            api_url: config.ocrspace_api_url.clone(),
            language: "eng".to_string(),
            timeout_secs: OCR_TIMEOUT_SECS.max(config.ai_timeout_secs),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OcrResponse {
    #[serde(default)]
    parsed_results: Vec<ParsedResult>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Option<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ErrorMessage {
    fn joined(self) -> String {
        match self {
            ErrorMessage::One(msg) => msg,
            ErrorMessage::Many(msgs) => msgs.join("; "),
        }
    }
}

/// Map a filename to the OCR.space file type and data-URI media type
fn file_kind(filename: &str) -> (&'static str, &'static str) {
    let lower = filename.to_lowercase();
    if lower.ends_with(".png") {
        ("PNG", "image/png")
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        ("JPG", "image/jpeg")
    } else {
        ("PDF", "application/pdf")
    }
}

#[derive(Clone)]
pub struct OcrSpaceClient {
    client: Client,
    config: OcrSpaceConfig,
}

impl OcrSpaceClient {
    pub fn new(config: OcrSpaceConfig) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Extract the text of every page, pages separated by a blank line
    pub async fn extract_text(&self, bytes: &[u8], filename: &str) -> Result<String, AiError> {
        let (file_type, media_type) = file_kind(filename);
        let data_uri = format!("data:{};base64,{}", media_type, STANDARD.encode(bytes));

        debug!(filename, file_type, size = bytes.len(), "Sending document to OCR");

        let form = [
            ("apikey", self.config.api_key.as_str()),
            ("base64Image", data_uri.as_str()),
            ("language", self.config.language.as_str()),
            ("isOverlayRequired", "false"),
            ("OCREngine", OCR_ENGINE),
            ("filetype", file_type),
            ("isTable", "true"),
            ("scale", "true"),
        ];

        let response = self
            .client
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: OcrResponse = response.json().await?;

        if result.is_errored_on_processing {
            let message = result
                .error_message
                .map(ErrorMessage::joined)
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(filename, "OCR processing failed: {}", message);
            return Err(AiError::Ocr(message));
        }

        let text = result
            .parsed_results
            .into_iter()
            .map(|page| page.parsed_text)
            .collect::<Vec<_>>()
            .join("\n\n");

        if text.trim().is_empty() {
            return Err(AiError::Ocr("No text found in document".to_string()));
        }

        Ok(text)
    }
}
