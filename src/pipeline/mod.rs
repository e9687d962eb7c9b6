//! Run execution: stage capabilities, context assembly and the controller
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ragrun::pipeline::PipelineController;
//! use ragrun::pipeline::PipelineOptions;
//! use ragrun::pipeline::StageSet;
//! use ragrun::store::MemoryRunStore;
//!
//! async fn ask(stages: StageSet) -> ragrun::Result<()> {
//!     let store = Arc::new(MemoryRunStore::new());
//!     let controller = Arc::new(PipelineController::new(
//!         store,
//!         stages,
//!         PipelineOptions::default(),
//!     ));
//!
//!     let (record, handle) = controller.submit("r1", "What must I disclose?").await?;
//!     println!("{} is {}", record.id, record.status);
//!     let _outcome = handle.await;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod controller;
pub mod stages;

pub use context::ContextAssembler;
pub use controller::PipelineController;
pub use controller::PipelineOptions;
pub use controller::RunOutcome;
pub use controller::INSUFFICIENT_INFORMATION_ANSWER;
pub use stages::AnswerSynthesizer;
pub use stages::Document;
pub use stages::DocumentSource;
pub use stages::Embedder;
pub use stages::GenerationParams;
pub use stages::RetrievedDocument;
pub use stages::SearchHit;
pub use stages::StageOutput;
pub use stages::StageSet;
pub use stages::VectorSearch;
