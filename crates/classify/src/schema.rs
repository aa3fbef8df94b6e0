use extract::{Classification, ClassificationMethod, GeometryKind};
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;

/// What the classifier is told about one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRequest {
    pub block_identifier: String,
    pub geometry_kind: GeometryKind,
    pub area: f64,
    pub vertex_count: usize,
    pub neighboring_identifiers: Vec<String>,
}

/// A classifier answer that passed validation: non-empty tags and a finite
/// confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse")]
pub struct ClassifierResponse {
    category: String,
    #[serde(rename = "type")]
    kind: String,
    confidence: f64,
    reasoning: String,
}

#[derive(Deserialize)]
struct RawResponse {
    category: String,
    #[serde(rename = "type")]
    kind: String,
    confidence: f64,
    reasoning: String,
}

impl TryFrom<RawResponse> for ClassifierResponse {
    type Error = ClassifierError;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        Self::new(raw.category, raw.kind, raw.confidence, raw.reasoning)
    }
}

impl ClassifierResponse {
    pub fn new(
        category: impl Into<String>,
        kind: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Result<Self, ClassifierError> {
        let category = category.into().trim().to_string();
        let kind = kind.into().trim().to_string();

        if category.is_empty() || kind.is_empty() {
            return Err(ClassifierError::InvalidResponse(
                "empty category or type".to_string(),
            ));
        }
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ClassifierError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }

        Ok(Self {
            category,
            kind,
            confidence,
            reasoning: reasoning.into(),
        })
    }

    /// Parse model output, tolerating a surrounding markdown code fence.
    pub fn parse(text: &str) -> Result<Self, ClassifierError> {
        let body = strip_code_fence(text);
        Ok(serde_json::from_str(body)?)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn into_classification(self, method: ClassificationMethod) -> Classification {
        Classification {
            category: self.category,
            kind: self.kind,
            confidence: self.confidence,
            reasoning: self.reasoning,
            method,
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let (start, marker_len) = if let Some(i) = text.find("```json") {
        (i, 7)
    } else if let Some(i) = text.find("```") {
        (i, 3)
    } else {
        return text;
    };

    let rest = &text[start + marker_len..];
    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let r = ClassifierResponse::parse(
            r#"{"category": "parking", "type": "basic", "confidence": 0.92, "reasoning": "PARK prefix"}"#,
        )
        .unwrap();
        assert_eq!(r.category(), "parking");
        assert_eq!(r.kind(), "basic");
        assert_eq!(r.confidence(), 0.92);
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Here you go:\n```json\n{\"category\": \"structure\", \"type\": \"column\", \"confidence\": 1, \"reasoning\": \"C1\"}\n```";
        let r = ClassifierResponse::parse(text).unwrap();
        assert_eq!(r.kind(), "column");
        assert_eq!(r.confidence(), 1.0);
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let err = ClassifierResponse::parse(r#"{"category": "parking", "type": "basic", "confidence": 0.5}"#)
            .unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidResponse(_)));
    }

    #[test]
    fn test_out_of_range_confidence_is_invalid() {
        let err = ClassifierResponse::parse(
            r#"{"category": "parking", "type": "basic", "confidence": 7.5, "reasoning": ""}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidResponse(_)));
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        assert!(ClassifierResponse::parse(
            r#"{"category": "parking", "type": "basic", "confidence": "high", "reasoning": ""}"#
        )
        .is_err());
        assert!(ClassifierResponse::parse("not json at all").is_err());
    }

    #[test]
    fn test_blank_category_is_invalid() {
        assert!(ClassifierResponse::new("  ", "basic", 0.5, "").is_err());
    }

    #[test]
    fn test_into_classification() {
        let c = ClassifierResponse::new("parking", "basic", 0.9, "name")
            .unwrap()
            .into_classification(ClassificationMethod::Classified);
        assert_eq!(c.method, ClassificationMethod::Classified);
        assert_eq!(c.kind, "basic");
    }
}
