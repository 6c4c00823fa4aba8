use serde::{Deserialize, Serialize};

/// Body of `POST /extract_and_summarize`.
///
/// `pdf_url` is kept as a raw JSON value: an absent, null, empty or otherwise
/// falsy value means "no URL", while a truthy non-string value is an invalid
/// URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionRequest {
    #[serde(default)]
    pub pdf_url: serde_json::Value,
}

impl ExtractionRequest {
    /// True when no usable URL was supplied at all.
    pub fn is_missing_url(&self) -> bool {
        is_falsy(&self.pdf_url)
    }
}

fn is_falsy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => true,
        Value::Bool(b) => !*b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(body: serde_json::Value) -> ExtractionRequest {
        serde_json::from_value(body).expect("request parses")
    }

    #[test]
    fn missing_and_falsy_urls_count_as_missing() {
        for body in [
            json!({}),
            json!({"pdf_url": null}),
            json!({"pdf_url": ""}),
            json!({"pdf_url": false}),
            json!({"pdf_url": 0}),
            json!({"pdf_url": []}),
            json!({"pdf_url": {}}),
        ] {
            assert!(request(body.clone()).is_missing_url(), "{} should be missing", body);
        }
    }

    #[test]
    fn truthy_values_are_not_missing() {
        for body in [
            json!({"pdf_url": "x"}),
            json!({"pdf_url": 5}),
            json!({"pdf_url": true}),
            json!({"pdf_url": ["a"]}),
        ] {
            assert!(!request(body.clone()).is_missing_url(), "{} should be present", body);
        }
    }
}
