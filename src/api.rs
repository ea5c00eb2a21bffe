use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::bail_server;
use crate::error::{SummaryResult, SummaryServerError};
use crate::inference::ModelHandle;

const DEFAULT_MAX_LENGTH: i64 = 130;
const DEFAULT_MIN_LENGTH: i64 = 30;
const MIN_TEXT_CHARS: usize = 50;
const MAX_TEXT_CHARS: usize = 15_000;

#[derive(Clone)]
pub struct AppState {
    pub model: ModelHandle,
}

#[derive(Serialize, Debug)]
pub struct SummarizeResponse {
    pub summary: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/summarize", post(handle_summarize_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[axum_macros::debug_handler]
async fn handle_summarize_request(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> SummaryResult<(StatusCode, Json<SummarizeResponse>)> {
    let engine = match &state.model {
        ModelHandle::Loaded(engine) => engine,
        ModelHandle::Unavailable => bail_server!(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Summarization model not loaded. Please check server logs and ensure all dependencies are met."
        ),
    };

    let body = match payload {
        Ok(Json(body)) => body,
        Err(_) => bail_server!(
            StatusCode::BAD_REQUEST,
            "Invalid request. Please send JSON with a 'text' field."
        ),
    };
    let params = validate(&body)?;

    match engine.summarize(&params.text, params.max_length, params.min_length, true) {
        Ok(summary) if summary.is_empty() => bail_server!(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Summarization model failed to produce a valid output. Try different text or parameters, or a different model."
        ),
        Ok(summary) => Ok((StatusCode::OK, Json(SummarizeResponse { summary }))),
        Err(err) => {
            error!("An error occurred during summarization: {err:#}");
            bail_server!(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred during summarization: {}. Please try again.",
                err
            )
        }
    }
}

struct SummarizeParams {
    text: String,
    max_length: usize,
    min_length: usize,
}

/// Linear validation chain over the raw JSON body; the first failing check
/// aborts the request with its status and message.
fn validate(body: &Value) -> Result<SummarizeParams, SummaryServerError> {
    let text = match body.get("text") {
        Some(text) => text,
        None => bail_server!(
            StatusCode::BAD_REQUEST,
            "Invalid request. Please send JSON with a 'text' field."
        ),
    };
    let text = match text.as_str() {
        Some(text) => text,
        None => bail_server!(StatusCode::BAD_REQUEST, "Input text must be a string."),
    };

    // Bounds count characters, not bytes.
    let char_count = text.chars().count();
    if char_count == 0 {
        bail_server!(StatusCode::BAD_REQUEST, "Input text cannot be empty.");
    }
    if char_count < MIN_TEXT_CHARS {
        bail_server!(
            StatusCode::BAD_REQUEST,
            "Input text too short. Please provide at least 50 characters for summarization."
        );
    }
    if char_count > MAX_TEXT_CHARS {
        bail_server!(
            StatusCode::BAD_REQUEST,
            "Input text too long. Please provide text up to 15,000 characters."
        );
    }

    let (max_length, min_length) = match (
        coerce_length(body.get("max_length"), DEFAULT_MAX_LENGTH),
        coerce_length(body.get("min_length"), DEFAULT_MIN_LENGTH),
    ) {
        (Some(max_length), Some(min_length)) => (max_length, min_length),
        _ => bail_server!(
            StatusCode::BAD_REQUEST,
            "Invalid 'max_length' or 'min_length' provided. Must be integers."
        ),
    };

    // The quoted ranges predate the enforced caps being raised to 1000; the
    // wording is part of the response contract and stays as-is.
    if !(10..=1000).contains(&min_length) {
        bail_server!(
            StatusCode::BAD_REQUEST,
            "Minimum length must be between 10 and 400 tokens."
        );
    }
    if !(50..=1000).contains(&max_length) {
        bail_server!(
            StatusCode::BAD_REQUEST,
            "Maximum length must be between 50 and 500 tokens."
        );
    }
    if min_length >= max_length {
        bail_server!(
            StatusCode::BAD_REQUEST,
            "Minimum length must be less than maximum length."
        );
    }

    Ok(SummarizeParams {
        text: text.to_string(),
        max_length: max_length as usize,
        min_length: min_length as usize,
    })
}

/// Integer coercion for the optional length fields: integers pass through,
/// floats truncate and numeric strings parse. Anything else fails.
fn coerce_length(value: Option<&Value>, default: i64) -> Option<i64> {
    match value {
        None => Some(default),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        Some(Value::String(string)) => string.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_message(result: Result<SummarizeParams, SummaryServerError>) -> (StatusCode, String) {
        let err = result.err().expect("expected a validation failure");
        let body = serde_json::to_value(&err.message).unwrap();
        (err.status, body["error"].as_str().unwrap().to_string())
    }

    fn valid_text() -> String {
        "a".repeat(60)
    }

    #[test]
    fn missing_text_field_is_rejected() {
        let (status, message) = error_message(validate(&json!({})));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Invalid request. Please send JSON with a 'text' field.");

        // A non-object body carries no 'text' field either.
        let (_, message) = error_message(validate(&json!(["text"])));
        assert_eq!(message, "Invalid request. Please send JSON with a 'text' field.");
    }

    #[test]
    fn non_string_text_is_rejected() {
        let (status, message) = error_message(validate(&json!({ "text": 42 })));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Input text must be a string.");

        let (_, message) = error_message(validate(&json!({ "text": null })));
        assert_eq!(message, "Input text must be a string.");
    }

    #[test]
    fn text_length_gate() {
        let (_, message) = error_message(validate(&json!({ "text": "" })));
        assert_eq!(message, "Input text cannot be empty.");

        let (_, message) = error_message(validate(&json!({ "text": "a".repeat(49) })));
        assert_eq!(
            message,
            "Input text too short. Please provide at least 50 characters for summarization."
        );

        let (_, message) = error_message(validate(&json!({ "text": "a".repeat(15_001) })));
        assert_eq!(
            message,
            "Input text too long. Please provide text up to 15,000 characters."
        );

        assert!(validate(&json!({ "text": "a".repeat(50) })).is_ok());
        assert!(validate(&json!({ "text": "a".repeat(15_000) })).is_ok());
    }

    #[test]
    fn text_length_counts_characters_not_bytes() {
        // 50 multibyte characters pass the gate even though they exceed 50 bytes.
        assert!(validate(&json!({ "text": "€".repeat(50) })).is_ok());
    }

    #[test]
    fn length_defaults_apply_when_absent() {
        let params = validate(&json!({ "text": valid_text() })).unwrap();
        assert_eq!(params.max_length, 130);
        assert_eq!(params.min_length, 30);
    }

    #[test]
    fn length_coercion_accepts_numbers_and_numeric_strings() {
        let params = validate(&json!({
            "text": valid_text(),
            "max_length": 200,
            "min_length": "15",
        }))
        .unwrap();
        assert_eq!(params.max_length, 200);
        assert_eq!(params.min_length, 15);

        // Floats truncate.
        let params = validate(&json!({
            "text": valid_text(),
            "max_length": 130.9,
        }))
        .unwrap();
        assert_eq!(params.max_length, 130);
    }

    #[test]
    fn length_coercion_rejects_non_numeric_values() {
        for bad in [json!("abc"), json!(null), json!([10]), json!({"n": 10})] {
            let (status, message) = error_message(validate(&json!({
                "text": valid_text(),
                "max_length": bad,
            })));
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                message,
                "Invalid 'max_length' or 'min_length' provided. Must be integers."
            );
        }
    }

    #[test]
    fn min_length_bounds() {
        for out_of_range in [9, 1001, -5, 0] {
            let (_, message) = error_message(validate(&json!({
                "text": valid_text(),
                "min_length": out_of_range,
            })));
            assert_eq!(message, "Minimum length must be between 10 and 400 tokens.");
        }
        // The full enforced range passes, beyond what the message quotes.
        assert!(validate(&json!({ "text": valid_text(), "min_length": 999, "max_length": 1000 })).is_ok());
    }

    #[test]
    fn max_length_bounds() {
        for out_of_range in [49, 1001, 0] {
            let (_, message) = error_message(validate(&json!({
                "text": valid_text(),
                "max_length": out_of_range,
            })));
            assert_eq!(message, "Maximum length must be between 50 and 500 tokens.");
        }
        assert!(validate(&json!({ "text": valid_text(), "max_length": 1000 })).is_ok());
    }

    #[test]
    fn min_length_must_stay_below_max_length() {
        for (min_length, max_length) in [(400, 100), (100, 100)] {
            let (_, message) = error_message(validate(&json!({
                "text": valid_text(),
                "min_length": min_length,
                "max_length": max_length,
            })));
            assert_eq!(message, "Minimum length must be less than maximum length.");
        }
    }

    #[test]
    fn coerce_length_defaults_only_when_field_is_absent() {
        assert_eq!(coerce_length(None, 130), Some(130));
        assert_eq!(coerce_length(Some(&json!(77)), 130), Some(77));
        assert_eq!(coerce_length(Some(&json!(" 77 ")), 130), Some(77));
        assert_eq!(coerce_length(Some(&json!(null)), 130), None);
        assert_eq!(coerce_length(Some(&json!(true)), 130), None);
    }
}
