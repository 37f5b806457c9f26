//! Structured response extraction.
//!
//! Model output should contain one JSON value but routinely arrives wrapped in
//! commentary, inside fenced blocks, or with invalid characters in string
//! literals. [`extract`] recovers a typed value through an ordered chain of
//! strategies; the first success wins and stages 2 to 4 try the raw candidate
//! before a [`sanitize_json`]-repaired variant. The whole text's repaired
//! variant is stage 5, so stage 1 parses raw only:
//!
//! 1. `direct` - the whole trimmed text, unmodified
//! 2. `fenced-block` - the interior of a ```` ```json ```` or ```` ``` ```` block
//! 3. `bracketed-array` - a top-level `[ ... ]` span (array shape only)
//! 4. `delimiter-scan` - first opening to last closing delimiter
//! 5. `full-sanitize` - the sanitized whole text
//!
//! Failures fall through silently; exhausting the chain yields
//! [`ExtractionOutcome::Failed`], a per-call outcome rather than an error.

mod sanitize;

#[cfg(test)]
mod proptest;

pub use sanitize::sanitize_json;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::{EventSink, PipelineEvent};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("invalid regex")
});

static BRACKETED_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    // Array of objects spanning to the last closing brace, or a flat array.
    Regex::new(r"(?s)\[\s*(?:\{.*\}|[^\[\]]*)\s*\]").expect("invalid regex")
});

/// Strategy that produced an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionStrategy {
    Direct,
    FencedBlock,
    BracketedArray,
    DelimiterScan,
    FullSanitize,
}

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::FencedBlock => "fenced-block",
            Self::BracketedArray => "bracketed-array",
            Self::DelimiterScan => "delimiter-scan",
            Self::FullSanitize => "full-sanitize",
        }
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON shape the caller expects; steers the array and delimiter stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedShape {
    Array,
    Object,
    #[default]
    Any,
}

impl ExpectedShape {
    /// Delimiter pairs in the order the scan stage tries them.
    fn delimiters(&self) -> [(char, char); 2] {
        match self {
            Self::Object => [('{', '}'), ('[', ']')],
            Self::Array | Self::Any => [('[', ']'), ('{', '}')],
        }
    }
}

/// Result of one extraction call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome<T> {
    Extracted {
        strategy: ExtractionStrategy,
        /// Whether the sanitized variant of the candidate parsed
        sanitized: bool,
        value: T,
    },
    Failed {
        reason: String,
    },
}

impl<T> ExtractionOutcome<T> {
    pub fn is_extracted(&self) -> bool {
        matches!(self, Self::Extracted { .. })
    }

    pub fn strategy(&self) -> Option<ExtractionStrategy> {
        match self {
            Self::Extracted { strategy, .. } => Some(*strategy),
            Self::Failed { .. } => None,
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            Self::Extracted { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Extracted { value, .. } => Ok(value),
            Self::Failed { reason } => Err(Error::Extraction(reason)),
        }
    }
}

/// Parse `candidate` raw, then sanitized.
fn parse_candidate<T: DeserializeOwned>(candidate: &str) -> Option<(T, bool)> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some((value, false));
    }
    serde_json::from_str(&sanitize_json(candidate))
        .ok()
        .map(|value| (value, true))
}

/// Span from the first `open` to the last `close`, inclusive.
fn delimited_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}

/// Extract a value of any shape from model output.
pub fn extract<T: DeserializeOwned>(raw: &str) -> ExtractionOutcome<T> {
    extract_with_shape(raw, ExpectedShape::Any)
}

/// Extract a value, steering the array and delimiter stages by `shape`.
pub fn extract_with_shape<T: DeserializeOwned>(
    raw: &str,
    shape: ExpectedShape,
) -> ExtractionOutcome<T> {
    let text = raw.trim();
    if text.is_empty() {
        return ExtractionOutcome::Failed {
            reason: "empty response".to_string(),
        };
    }

    let extracted = |strategy: ExtractionStrategy, (value, sanitized): (T, bool)| {
        ExtractionOutcome::Extracted {
            strategy,
            sanitized,
            value,
        }
    };

    if let Ok(value) = serde_json::from_str(text) {
        return extracted(ExtractionStrategy::Direct, (value, false));
    }

    for block in FENCED_BLOCK.captures_iter(text) {
        if let Some(parsed) = block.get(1).and_then(|m| parse_candidate(m.as_str())) {
            return extracted(ExtractionStrategy::FencedBlock, parsed);
        }
    }

    if shape == ExpectedShape::Array {
        if let Some(parsed) = BRACKETED_ARRAY
            .find(text)
            .and_then(|m| parse_candidate(m.as_str()))
        {
            return extracted(ExtractionStrategy::BracketedArray, parsed);
        }
    }

    for (open, close) in shape.delimiters() {
        if let Some(parsed) = delimited_span(text, open, close).and_then(parse_candidate) {
            return extracted(ExtractionStrategy::DelimiterScan, parsed);
        }
    }

    if let Ok(value) = serde_json::from_str(&sanitize_json(text)) {
        return extracted(ExtractionStrategy::FullSanitize, (value, true));
    }

    ExtractionOutcome::Failed {
        reason: format!(
            "no strategy recovered a value from {} characters of output",
            text.chars().count()
        ),
    }
}

/// Extractor that reports the chosen strategy to an event sink.
#[derive(Clone, Default)]
pub struct StructuredExtractor {
    label: String,
    sink: Option<Arc<dyn EventSink>>,
}

impl StructuredExtractor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn extract<T: DeserializeOwned>(
        &self,
        raw: &str,
        shape: ExpectedShape,
    ) -> ExtractionOutcome<T> {
        let outcome = extract_with_shape(raw, shape);
        match &outcome {
            ExtractionOutcome::Extracted {
                strategy,
                sanitized,
                ..
            } => {
                if let Some(sink) = &self.sink {
                    sink.emit(PipelineEvent::extraction_strategy(
                        self.label.as_str(),
                        strategy.as_str(),
                        *sanitized,
                    ));
                }
            }
            ExtractionOutcome::Failed { reason } => {
                debug!(label = %self.label, reason = %reason, "extraction failed");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingSink, PipelineEventType};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[test]
    fn test_direct_valid_json() {
        let outcome: ExtractionOutcome<Value> = extract(r#"  {"a": 1, "b": [true]}  "#);
        assert_eq!(
            outcome,
            ExtractionOutcome::Extracted {
                strategy: ExtractionStrategy::Direct,
                sanitized: false,
                value: json!({"a": 1, "b": [true]}),
            }
        );
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let outcome: ExtractionOutcome<Value> =
            extract("Here is the result:\n```json\n{\"a\":1}\n```\nThanks");
        assert_eq!(outcome.strategy(), Some(ExtractionStrategy::FencedBlock));
        assert_eq!(outcome.value(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_unlabelled_fence() {
        let outcome: ExtractionOutcome<Value> = extract("```\n[1, 2, 3]\n```");
        assert_eq!(outcome.strategy(), Some(ExtractionStrategy::FencedBlock));
        assert_eq!(outcome.value(), Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_literal_newline_repaired_by_delimiter_scan() {
        // Stage 1 parses raw only; the object span is the first stage to retry sanitized.
        let raw = "{\"description\": \"Mints tokens\nto an address\"}";
        let outcome: ExtractionOutcome<Value> = extract(raw);
        match outcome {
            ExtractionOutcome::Extracted {
                strategy,
                sanitized,
                value,
            } => {
                assert_eq!(strategy, ExtractionStrategy::DelimiterScan);
                assert!(sanitized);
                assert_eq!(value["description"], "Mints tokens\nto an address");
            }
            ExtractionOutcome::Failed { reason } => panic!("extraction failed: {}", reason),
        }
    }

    #[test]
    fn test_bracketed_array_with_embedded_objects() {
        let raw = r#"The nodes are [{"id": "a"}, {"id": "b"}] as requested."#;
        let outcome: ExtractionOutcome<Vec<Value>> = extract_with_shape(raw, ExpectedShape::Array);
        assert_eq!(outcome.strategy(), Some(ExtractionStrategy::BracketedArray));
        assert_eq!(outcome.value().map(|v| v.len()), Some(2));
    }

    #[test]
    fn test_delimiter_scan_object() {
        let raw = r#"Sure! {"transfer": {"description": "moves [tokens]"}} Let me know."#;
        let outcome: ExtractionOutcome<Value> = extract_with_shape(raw, ExpectedShape::Object);
        assert_eq!(outcome.strategy(), Some(ExtractionStrategy::DelimiterScan));
        assert_eq!(
            outcome.value(),
            Some(json!({"transfer": {"description": "moves [tokens]"}}))
        );
    }

    #[test]
    fn test_delimiter_scan_prefers_arrays_for_any() {
        let raw = r#"result: [1, 2] and {"x": 1}"#;
        let outcome: ExtractionOutcome<Value> = extract(raw);
        assert_eq!(outcome.strategy(), Some(ExtractionStrategy::DelimiterScan));
        assert_eq!(outcome.value(), Some(json!([1, 2])));

        let outcome: ExtractionOutcome<Value> = extract_with_shape(raw, ExpectedShape::Object);
        assert_eq!(outcome.value(), Some(json!({"x": 1})));
    }

    #[test]
    fn test_full_sanitize_stage() {
        let raw = "\\\"done\\\"";
        let outcome: ExtractionOutcome<Value> = extract(raw);
        assert_eq!(outcome.strategy(), Some(ExtractionStrategy::FullSanitize));
        assert_eq!(outcome.value(), Some(json!("done")));
    }

    #[test]
    fn test_empty_input_fails_immediately() {
        let outcome: ExtractionOutcome<Value> = extract("   \n\t ");
        assert_eq!(
            outcome,
            ExtractionOutcome::Failed {
                reason: "empty response".to_string()
            }
        );
    }

    #[test]
    fn test_unrecoverable_text_fails() {
        let outcome: ExtractionOutcome<Value> = extract("I could not analyze this contract.");
        assert!(!outcome.is_extracted());
        assert!(matches!(outcome.into_result(), Err(Error::Extraction(_))));
    }

    #[test]
    fn test_typed_extraction_mismatch_falls_through() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Node {
            id: String,
        }

        let outcome: ExtractionOutcome<Vec<Node>> = extract(r#"{"id": "a"}"#);
        assert!(!outcome.is_extracted());
    }

    #[test]
    fn test_structured_extractor_emits_strategy() {
        let sink = CollectingSink::new();
        let extractor = StructuredExtractor::new("diagram").with_sink(Arc::new(sink.clone()));

        let outcome: ExtractionOutcome<Value> =
            extractor.extract("```json\n{\"nodes\": []}\n```", ExpectedShape::Object);
        assert!(outcome.is_extracted());

        let events = sink.events_of(PipelineEventType::ExtractionStrategy);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "diagram");
        assert_eq!(
            events[0].get_metadata("strategy"),
            Some(&Value::from("fenced-block"))
        );
    }
}
