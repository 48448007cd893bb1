//! Generates reference images for storyboard records kept in a Notion
//! database and writes the results back.
pub mod batch;
pub mod config;
pub mod error;
pub mod imagegen;
pub mod model;
pub mod notion;
pub mod paginator;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod resolve;
pub mod retry;
pub mod writeback;
