//! Groq and OCR.space client tests
//!
//! Uses wiremock for HTTP mocking of both upstream APIs.

use std::sync::Arc;

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use coven_server::ai::{
    AiAdvisor, AiError, GroqClient, GroqConfig, OcrSpaceClient, OcrSpaceConfig, TextGenerator,
};
use coven_server::services::NarrativeSource;

const COMPLETIONS_PATH: &str = "/openai/v1/chat/completions";

fn groq_client(server: &MockServer) -> GroqClient {
    GroqClient::new(GroqConfig {
        api_key: "test-groq-key".to_string(),
        api_url: format!("{}{}", server.uri(), COMPLETIONS_PATH),
        timeout_secs: 5,
        ..Default::default()
    })
    .unwrap()
}

fn ocr_client(server: &MockServer) -> OcrSpaceClient {
    OcrSpaceClient::new(OcrSpaceConfig {
        api_key: "test-ocr-key".to_string(),
        api_url: format!("{}/parse/image", server.uri()),
        language: "eng".to_string(),
        timeout_secs: 5,
    })
    .unwrap()
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

#[tokio::test]
async fn test_groq_completion_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer test-groq-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "stream": false,
        })))
        .respond_with(completion("  Leverage is within limits.  "))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = groq_client(&mock_server);
    let reply = client
        .complete("You are a credit analyst.", "Summarize the loan.")
        .await
        .unwrap();

    assert_eq!(reply, "Leverage is within limits.");
}

#[tokio::test]
async fn test_groq_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let client = groq_client(&mock_server);
    let result = client.complete("system", "user").await;

    match result {
        Err(AiError::Status { status, body }) => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_groq_empty_choice() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(completion("   "))
        .mount(&mock_server)
        .await;

    let client = groq_client(&mock_server);
    assert!(matches!(
        client.complete("system", "user").await,
        Err(AiError::EmptyResponse)
    ));
}

#[tokio::test]
async fn test_advisor_extraction_from_groq_reply() {
    let mock_server = MockServer::start().await;
    let reply = r#"Here is the analysis:
{
  "keyTerms": {
    "facilityType": "Revolving Credit Facility",
    "purpose": "Working capital",
    "securityType": "Unsecured",
    "governingLaw": "English"
  },
  "extractedCovenants": [
    {"title": "Net Leverage", "type": "Financial", "threshold": "< 3.0x", "frequency": "Quarterly", "description": "Net debt to EBITDA"}
  ],
  "riskFactors": ["Refinancing risk"],
  "summary": "Five year revolving facility."
}"#;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(completion(reply))
        .mount(&mock_server)
        .await;

    let generator: Arc<dyn TextGenerator> = Arc::new(groq_client(&mock_server));
    let advisor = AiAdvisor::new(Some(generator));
    let (extraction, source) = advisor
        .extract_loan_dna("The Borrower shall maintain Net Leverage below 3.0x.")
        .await;

    assert_eq!(source, NarrativeSource::Ai);
    assert_eq!(extraction.confidence, 88);
    assert_eq!(extraction.key_terms.facility_type, "Revolving Credit Facility");
    assert_eq!(extraction.extracted_covenants.len(), 1);
    assert_eq!(extraction.extracted_covenants[0].title, "Net Leverage");
}

#[tokio::test]
async fn test_advisor_falls_back_when_groq_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let generator: Arc<dyn TextGenerator> = Arc::new(groq_client(&mock_server));
    let advisor = AiAdvisor::new(Some(generator));
    let (extraction, source) = advisor.extract_loan_dna("Some agreement text").await;

    assert_eq!(source, NarrativeSource::Fallback);
    assert_eq!(extraction.confidence, 75);
    assert!(extraction.summary.starts_with("[Automated fallback]"));
}

#[tokio::test]
async fn test_ocr_joins_pages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/parse/image"))
        .and(body_string_contains("apikey=test-ocr-key"))
        .and(body_string_contains("filetype=PDF"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ParsedResults": [
                { "ParsedText": "CREDIT AGREEMENT" },
                { "ParsedText": "Section 7.1 Financial Covenants" }
            ],
            "IsErroredOnProcessing": false
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ocr_client(&mock_server);
    let text = client
        .extract_text(b"%PDF-1.7 fake", "agreement.pdf")
        .await
        .unwrap();

    assert_eq!(text, "CREDIT AGREEMENT\n\nSection 7.1 Financial Covenants");
}

#[tokio::test]
async fn test_ocr_processing_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/parse/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "IsErroredOnProcessing": true,
            "ErrorMessage": ["File failed validation", "Maximum page limit reached"]
        })))
        .mount(&mock_server)
        .await;

    let client = ocr_client(&mock_server);
    match client.extract_text(b"\x89PNG", "scan.png").await {
        Err(AiError::Ocr(message)) => {
            assert_eq!(message, "File failed validation; Maximum page limit reached")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_ocr_blank_result_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/parse/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ParsedResults": [{ "ParsedText": "   " }],
            "IsErroredOnProcessing": false
        })))
        .mount(&mock_server)
        .await;

    let client = ocr_client(&mock_server);
    assert!(matches!(
        client.extract_text(b"%PDF", "blank.pdf").await,
        Err(AiError::Ocr(_))
    ));
}
