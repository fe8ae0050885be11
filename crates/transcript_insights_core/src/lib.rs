pub mod aggregator;
pub mod domain;
pub mod embedder;
pub mod extractor;
pub mod memory;
pub mod persistence;
pub mod pipeline;
pub mod ports;
pub mod retry;
pub mod similarity;
pub mod validator;

pub use domain::{
    AnalysisResult, Company, FollowUp, FollowUpStatus, Meeting, PipelineOutput, RecurringIssue,
    TranscriptSubmission,
};
pub use memory::InMemoryStore;
pub use pipeline::{AnalysisPipeline, PipelineError, PipelineSettings};
pub use ports::{EmbeddingService, InsightStore, LanguageModelService, PortError, PortResult};
