//! Small, independent helpers around public academic APIs (Semantic Scholar,
//! arXiv, CrossRef), a reference-following flow, and local text generation.

pub mod apis;
pub mod config;
pub mod demo;
pub mod download;
pub mod generate;
pub mod references;

pub use apis::SourceError;
pub use config::Config;
