//! Batched model analysis of compiled contracts.
//!
//! Function names come from the ABI and are processed in fixed-size batches,
//! one model call per batch. A failed batch is logged and skipped; the
//! report carries whatever the other batches produced.
//!
//! - [`DocumentationAnalyzer`] describes each function
//! - [`DiagramAnalyzer`] draws a general flow graph and one per documented
//!   function
//! - [`retry_with_backoff`] reruns a whole pipeline when it yields nothing

mod batch;
mod diagram;
mod documentation;
mod retry;

pub use batch::{
    split_batches, AnalysisBatch, BatchMergeAccumulator, BatchRecord, BatchRunner,
    DEFAULT_BATCH_SIZE, ERROR_MARKER_KEY,
};
pub use diagram::{
    DiagramAnalyzer, DiagramData, DiagramEdge, DiagramNode, DiagramReport, NodeId,
};
pub use documentation::{
    abi_function_names, DocumentationAnalyzer, DocumentationReport, FunctionAnalysis,
};
pub use retry::{
    retry_with_backoff, Retried, RetryPolicy, DEFAULT_BACKOFF_MS, DEFAULT_PIPELINE_RETRIES,
};
