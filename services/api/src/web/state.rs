//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use transcript_insights_core::{AnalysisPipeline, InsightStore};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: AnalysisPipeline,
    /// Read and update paths that bypass the pipeline.
    pub store: Arc<dyn InsightStore>,
}

impl AppState {
    pub fn new(pipeline: AnalysisPipeline, store: Arc<dyn InsightStore>) -> Self {
        Self { pipeline, store }
    }
}
