//! Pipeline event types for observable generation and analysis runs.
//!
//! Orchestrators report progress through an [`EventSink`] at fixed extension
//! points instead of logging inline:
//! - generation attempt start/end
//! - analysis batch start/end
//! - extraction strategy chosen
//! - model call failures
//!
//! [`TracingSink`] forwards events to `tracing`; [`CollectingSink`] keeps them
//! in memory for assertions; [`NullSink`] drops them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Types of events emitted during a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineEventType {
    /// Generation attempt started
    AttemptStart,
    /// Generation attempt finished (any outcome)
    AttemptEnd,
    /// Analysis batch started
    BatchStart,
    /// Analysis batch finished (any outcome)
    BatchEnd,
    /// Extractor recovered a value with a strategy
    ExtractionStrategy,
    /// Model call failed and was normalized to "no result"
    ModelCallFailed,
}

impl std::fmt::Display for PipelineEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AttemptStart => "ATTEMPT_START",
            Self::AttemptEnd => "ATTEMPT_END",
            Self::BatchStart => "BATCH_START",
            Self::BatchEnd => "BATCH_END",
            Self::ExtractionStrategy => "EXTRACTION_STRATEGY",
            Self::ModelCallFailed => "MODEL_CALL_FAILED",
        };
        write!(f, "{}", s)
    }
}

/// An event emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Type of the event
    pub event_type: PipelineEventType,
    /// Phase label (e.g. `generate`, `documentation batch 2`)
    pub label: String,
    /// Human-readable content describing the event
    pub content: String,
    /// Event-specific metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    /// Create a new pipeline event.
    pub fn new(
        event_type: PipelineEventType,
        label: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            label: label.into(),
            content: content.into(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// Add metadata to the event.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Get a metadata value.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    pub fn attempt_start(label: impl Into<String>, attempt: u32, kind: &str) -> Self {
        Self::new(
            PipelineEventType::AttemptStart,
            label,
            format!("attempt {} ({})", attempt, kind),
        )
        .with_metadata("attempt", attempt)
        .with_metadata("kind", kind)
    }

    pub fn attempt_end(
        label: impl Into<String>,
        attempt: u32,
        outcome: &str,
        error_count: usize,
    ) -> Self {
        Self::new(
            PipelineEventType::AttemptEnd,
            label,
            format!("attempt {} {} with {} error(s)", attempt, outcome, error_count),
        )
        .with_metadata("attempt", attempt)
        .with_metadata("outcome", outcome)
        .with_metadata("errors", error_count)
    }

    pub fn batch_start(label: impl Into<String>, index: usize, members: &[String]) -> Self {
        Self::new(
            PipelineEventType::BatchStart,
            label,
            format!("batch {}: {}", index + 1, members.join(", ")),
        )
        .with_metadata("batch", index)
        .with_metadata("size", members.len())
    }

    pub fn batch_end(label: impl Into<String>, index: usize, merged: usize, success: bool) -> Self {
        Self::new(
            PipelineEventType::BatchEnd,
            label,
            format!(
                "batch {} {} ({} merged)",
                index + 1,
                if success { "succeeded" } else { "failed" },
                merged
            ),
        )
        .with_metadata("batch", index)
        .with_metadata("merged", merged)
        .with_metadata("success", success)
    }

    pub fn extraction_strategy(label: impl Into<String>, strategy: &str, sanitized: bool) -> Self {
        Self::new(
            PipelineEventType::ExtractionStrategy,
            label,
            format!("extracted via {}", strategy),
        )
        .with_metadata("strategy", strategy)
        .with_metadata("sanitized", sanitized)
    }

    pub fn model_call_failed(label: impl Into<String>, failure: &str, message: &str) -> Self {
        Self::new(PipelineEventType::ModelCallFailed, label, message.to_string())
            .with_metadata("failure", failure)
    }

    /// Check if this event reports a failure.
    pub fn is_failure(&self) -> bool {
        match self.event_type {
            PipelineEventType::ModelCallFailed => true,
            PipelineEventType::BatchEnd => {
                self.get_metadata("success") == Some(&Value::Bool(false))
            }
            _ => false,
        }
    }

    /// Format as a single-line log entry.
    pub fn as_log_line(&self) -> String {
        format!(
            "[{}] {} {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.event_type,
            self.label,
            self.content.lines().next().unwrap_or("")
        )
    }
}

/// Destination for pipeline events.
pub trait EventSink: Send + Sync {
    /// Emit a pipeline event.
    fn emit(&self, event: PipelineEvent);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PipelineEvent) {
        if event.is_failure() {
            tracing::warn!(
                event = %event.event_type,
                label = %event.label,
                "{}",
                event.content
            );
        } else {
            tracing::debug!(
                event = %event.event_type,
                label = %event.label,
                "{}",
                event.content
            );
        }
    }
}

/// Collecting sink that stores events in a Vec.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Arc<RwLock<Vec<PipelineEvent>>>,
}

impl CollectingSink {
    /// Create new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get collected events.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Collected events of one type.
    pub fn events_of(&self, event_type: PipelineEventType) -> Vec<PipelineEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Clear collected events.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

/// Null sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}
