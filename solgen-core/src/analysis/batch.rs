//! Fixed-size batching with a failure-tolerant merge.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::events::{EventSink, PipelineEvent};
use crate::extract::{ExpectedShape, ExtractionOutcome, StructuredExtractor};
use crate::llm::{ChatMessage, ModelCaller};

/// Default number of names per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Response key a model uses to report that it could not analyze a batch.
/// It is never merged.
pub const ERROR_MARKER_KEY: &str = "error";

/// A slice of the name list processed by one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisBatch {
    pub index: usize,
    pub member_names: Vec<String>,
}

/// Split `names` into batches of `batch_size` (at least 1); the last batch
/// may be smaller.
pub fn split_batches(names: &[String], batch_size: usize) -> Vec<AnalysisBatch> {
    names
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| AnalysisBatch {
            index,
            member_names: chunk.to_vec(),
        })
        .collect()
}

/// Name-keyed results merged from successful batches.
///
/// Entries are only ever inserted or replaced, so the map never shrinks.
/// `overall_success` turns false on the first failed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMergeAccumulator<V> {
    entries: IndexMap<String, V>,
    overall_success: bool,
    failed_batches: Vec<usize>,
}

impl<V> Default for BatchMergeAccumulator<V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            overall_success: true,
            failed_batches: Vec::new(),
        }
    }
}

impl<V> BatchMergeAccumulator<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch's entries; returns how many were merged.
    pub fn merge(&mut self, entries: impl IntoIterator<Item = (String, V)>) -> usize {
        let mut merged = 0;
        for (name, value) in entries {
            self.entries.insert(name, value);
            merged += 1;
        }
        merged
    }

    pub fn mark_failed(&mut self, batch_index: usize) {
        self.overall_success = false;
        self.failed_batches.push(batch_index);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn overall_success(&self) -> bool {
        self.overall_success
    }

    pub fn failed_batches(&self) -> &[usize] {
        &self.failed_batches
    }

    pub fn entries(&self) -> &IndexMap<String, V> {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn into_parts(self) -> (IndexMap<String, V>, bool, Vec<usize>) {
        (self.entries, self.overall_success, self.failed_batches)
    }
}

/// A per-name record a model response can be converted into.
pub trait BatchRecord: Sized {
    /// Convert one response value; `None` drops the entry.
    fn from_response(value: Value) -> Option<Self>;
}

/// Runs batches sequentially through the model caller and extractor.
pub struct BatchRunner<'a> {
    caller: &'a ModelCaller,
    sink: Arc<dyn EventSink>,
    label: &'a str,
    batch_size: usize,
}

impl<'a> BatchRunner<'a> {
    pub fn new(caller: &'a ModelCaller, label: &'a str) -> Self {
        Self {
            caller,
            sink: caller.sink(),
            label,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Process `names` batch by batch. A batch fails when the model gives no
    /// response, extraction fails, or no usable entry remains after the
    /// marker key is removed; failures are recorded and iteration continues.
    pub async fn run<V, P>(&self, names: &[String], build_messages: P) -> BatchMergeAccumulator<V>
    where
        V: BatchRecord,
        P: Fn(&AnalysisBatch) -> Vec<ChatMessage>,
    {
        let mut accumulator = BatchMergeAccumulator::new();

        for batch in split_batches(names, self.batch_size) {
            let batch_label = format!("{} batch {}", self.label, batch.index + 1);
            self.sink.emit(PipelineEvent::batch_start(
                self.label,
                batch.index,
                &batch.member_names,
            ));

            let merged = match self.process(&batch, &batch_label, &build_messages).await {
                Some(entries) => accumulator.merge(entries),
                None => 0,
            };

            let success = merged > 0;
            if success {
                debug!(label = %batch_label, merged, "batch merged");
            } else {
                warn!(label = %batch_label, "batch produced no usable entries");
                accumulator.mark_failed(batch.index);
            }
            self.sink
                .emit(PipelineEvent::batch_end(self.label, batch.index, merged, success));
        }

        accumulator
    }

    async fn process<V, P>(
        &self,
        batch: &AnalysisBatch,
        batch_label: &str,
        build_messages: &P,
    ) -> Option<Vec<(String, V)>>
    where
        V: BatchRecord,
        P: Fn(&AnalysisBatch) -> Vec<ChatMessage>,
    {
        let text = self
            .caller
            .call_or_none(batch_label, build_messages(batch))
            .await?;

        let extractor = StructuredExtractor::new(batch_label).with_sink(Arc::clone(&self.sink));
        let map: IndexMap<String, Value> = match extractor.extract(&text, ExpectedShape::Object) {
            ExtractionOutcome::Extracted { value, .. } => value,
            ExtractionOutcome::Failed { reason } => {
                warn!(label = batch_label, reason = %reason, "batch extraction failed");
                return None;
            }
        };

        if let Some(marker) = map.get(ERROR_MARKER_KEY) {
            warn!(label = batch_label, marker = %marker, "model reported an error for batch");
        }

        let (members, foreign): (Vec<_>, Vec<_>) = map
            .into_iter()
            .filter(|(name, _)| name != ERROR_MARKER_KEY)
            .partition(|(name, _)| batch.member_names.contains(name));
        if !foreign.is_empty() {
            let dropped: Vec<&str> = foreign.iter().map(|(name, _)| name.as_str()).collect();
            debug!(label = batch_label, ?dropped, "dropping keys outside the batch");
        }

        let entries: Vec<(String, V)> = members
            .into_iter()
            .filter_map(|(name, value)| V::from_response(value).map(|record| (name, record)))
            .collect();

        (!entries.is_empty()).then_some(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingSink, PipelineEventType};
    use crate::testing::ScriptedClient;
    use crate::error::Error;
    use proptest::prelude::*;

    impl BatchRecord for Value {
        fn from_response(value: Value) -> Option<Self> {
            Some(value)
        }
    }

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("fn{}", i)).collect()
    }

    fn reply_for(members: &[String]) -> String {
        let map: serde_json::Map<String, Value> = members
            .iter()
            .map(|m| (m.clone(), serde_json::json!({"description": m})))
            .collect();
        format!("```json\n{}\n```", Value::Object(map))
    }

    fn prompt(batch: &AnalysisBatch) -> Vec<ChatMessage> {
        vec![ChatMessage::user(batch.member_names.join(","))]
    }

    #[test]
    fn test_split_batches() {
        let batches = split_batches(&names(12), 5);
        assert_eq!(
            batches.iter().map(|b| b.member_names.len()).collect::<Vec<_>>(),
            vec![5, 5, 2]
        );
        assert_eq!(batches[2].index, 2);
        assert!(split_batches(&[], 5).is_empty());
        assert_eq!(split_batches(&names(3), 0).len(), 3);
    }

    #[test]
    fn test_accumulator_never_shrinks() {
        let mut acc: BatchMergeAccumulator<u32> = BatchMergeAccumulator::new();
        assert!(acc.overall_success());
        acc.merge(vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        acc.mark_failed(1);
        acc.merge(vec![("a".to_string(), 3)]);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.entries()["a"], 3);
        assert!(!acc.overall_success());
        assert_eq!(acc.failed_batches(), &[1]);
    }

    #[tokio::test]
    async fn test_middle_batch_failure_is_isolated() {
        let all = names(12);
        let batches = split_batches(&all, 5);
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(reply_for(&batches[0].member_names)),
            Err(Error::LLM("connection reset".to_string())),
            Ok(reply_for(&batches[2].member_names)),
        ]));
        let sink = CollectingSink::new();
        let caller = ModelCaller::new(client.clone()).with_sink(Arc::new(sink.clone()));

        let acc: BatchMergeAccumulator<Value> =
            BatchRunner::new(&caller, "documentation").run(&all, prompt).await;

        assert_eq!(acc.len(), 7);
        for name in batches[0].member_names.iter().chain(&batches[2].member_names) {
            assert!(acc.entries().contains_key(name), "missing {}", name);
        }
        for name in &batches[1].member_names {
            assert!(!acc.entries().contains_key(name));
        }
        assert!(!acc.overall_success());
        assert_eq!(acc.failed_batches(), &[1]);
        assert_eq!(client.requests().len(), 3);

        let ends = sink.events_of(PipelineEventType::BatchEnd);
        assert_eq!(ends.len(), 3);
        assert!(ends[1].is_failure());
    }

    #[tokio::test]
    async fn test_marker_only_response_is_failure() {
        let all = names(2);
        let client = Arc::new(ScriptedClient::new(vec![Ok(
            r#"{"error": "could not analyze"}"#.to_string()
        )]));
        let caller = ModelCaller::new(client);

        let acc: BatchMergeAccumulator<Value> =
            BatchRunner::new(&caller, "documentation").run(&all, prompt).await;

        assert!(acc.is_empty());
        assert!(!acc.overall_success());
    }

    #[tokio::test]
    async fn test_marker_key_is_stripped() {
        let all = names(1);
        let client = Arc::new(ScriptedClient::new(vec![Ok(
            r#"{"fn1": {"description": "x"}, "error": "partial"}"#.to_string(),
        )]));
        let caller = ModelCaller::new(client);

        let acc: BatchMergeAccumulator<Value> =
            BatchRunner::new(&caller, "documentation").run(&all, prompt).await;

        assert_eq!(acc.names(), vec!["fn1".to_string()]);
        assert!(acc.overall_success());
    }

    #[tokio::test]
    async fn test_keys_outside_the_batch_are_dropped() {
        let all = names(6);
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(reply_for(&all[..5])),
            Ok(r#"{"fn6": {"description": "fn6"}, "fn1": "CLOBBERED", "ghost": {"description": "?"}}"#
                .to_string()),
        ]));
        let caller = ModelCaller::new(client);

        let acc: BatchMergeAccumulator<Value> =
            BatchRunner::new(&caller, "documentation").run(&all, prompt).await;

        assert_eq!(acc.len(), 6);
        assert_eq!(acc.entries()["fn1"], serde_json::json!({"description": "fn1"}));
        assert!(!acc.entries().contains_key("ghost"));
        assert!(acc.overall_success());
    }

    #[tokio::test]
    async fn test_only_foreign_keys_is_failure() {
        let all = names(2);
        let client = Arc::new(ScriptedClient::new(vec![Ok(
            r#"{"ghost": {"description": "?"}}"#.to_string(),
        )]));
        let caller = ModelCaller::new(client);

        let acc: BatchMergeAccumulator<Value> =
            BatchRunner::new(&caller, "documentation").run(&all, prompt).await;

        assert!(acc.is_empty());
        assert_eq!(acc.failed_batches(), &[0]);
    }

    #[tokio::test]
    async fn test_each_prompt_names_its_batch() {
        let all = names(7);
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("{}".to_string()),
            Ok("{}".to_string()),
        ]));
        let caller = ModelCaller::new(client.clone());

        let _: BatchMergeAccumulator<Value> =
            BatchRunner::new(&caller, "documentation").run(&all, prompt).await;

        assert_eq!(
            client.prompts(),
            vec!["fn1,fn2,fn3,fn4,fn5".to_string(), "fn6,fn7".to_string()]
        );
    }

    proptest! {
        /// Batches cover every name once, in order, within the size bound.
        #[test]
        fn batches_cover_names(count in 0usize..40, size in 1usize..8) {
            let all = names(count);
            let batches = split_batches(&all, size);
            let flattened: Vec<String> =
                batches.iter().flat_map(|b| b.member_names.clone()).collect();
            prop_assert_eq!(flattened, all);
            prop_assert!(batches.iter().all(|b| !b.member_names.is_empty() && b.member_names.len() <= size));
            prop_assert_eq!(batches.len(), count.div_ceil(size));
        }
    }
}
