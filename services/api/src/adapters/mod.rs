pub mod db;
pub mod embeddings;
pub mod extraction_llm;

pub use db::DbAdapter;
pub use embeddings::OpenAiEmbeddingAdapter;
pub use extraction_llm::OpenAiExtractionAdapter;
