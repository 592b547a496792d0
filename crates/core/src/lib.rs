//! Core library: PDF conversion, chunking, embeddings, retrieval and the
//! conversational chain.

pub mod chain;
pub mod config;
pub mod converter;
pub mod embeddings;
pub mod extractor;
pub mod feedback;
pub mod history;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod splitter;
pub mod vectorstore;
