//! Summary Orchestrator core: coordinates deduplicated, idempotent
//! chapter-by-chapter summarization jobs over a remote LLM, publishing
//! progress to subscribers and persisting finalized chapters.
//!
//! The HTTP surface, translation post-processing, user accounts, the
//! concrete durable store, and the concrete LLM endpoint are out of scope —
//! this crate defines the interfaces ([`store::ChapterStore`],
//! [`llm::LlmClient`], [`captions::CaptionSource`], [`feedback::FeedbackReader`])
//! a host process wires up around [`orchestrator::Orchestrator`].

pub mod captions;
pub mod chapterizer;
pub mod chunker;
pub mod config;
pub mod error;
pub mod events;
pub mod feedback;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod refiner;
pub mod registry;
pub mod store;
pub mod token_counter;

pub use config::OrchestratorConfig;
pub use error::CoreError;
pub use model::{Chapter, ChapterHint, Feedback, Slicer, Style, SummaryState, TimedText};
pub use orchestrator::{Orchestrator, SummarizeRequest, SummarizeResponse};
