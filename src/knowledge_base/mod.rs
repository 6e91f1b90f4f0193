//! Client side of the managed retrieval-and-generation capability.

pub mod client;
pub mod prompt;
pub mod types;

pub use client::{InvokeError, KnowledgeBaseClient, RetrieveGenerate};
