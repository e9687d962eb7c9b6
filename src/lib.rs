//! Run lifecycle tracking for retrieval-augmented question answering
//!
//! A submitted question becomes a run that walks
//! `pending -> running -> {completed | failed}`. The [`store`] owns run
//! records, the [`pipeline`] executes runs in the background and the
//! [`notify`] hub fans progress out to live subscribers.

pub mod api;
pub mod cli;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod store;


pub use config::AppConfig;
pub use errors::*;
