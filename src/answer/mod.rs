//! Retrieval-augmented answering of checklist leaves.
//!
//! The answering path runs per leaf: embed the question title, search the vector index for
//! supporting passages scoped to the current run, then ask the chat model for a structured
//! answer constrained to the leaf's declared response options. Scheduling fans leaves out in
//! bounded batches and demotes per-leaf failures to a status field instead of aborting the run.

mod answerer;
mod chat;
mod progress;
mod publish;
mod scheduler;
mod schema;

pub use answerer::{AnswerError, LeafAnswerer, RetrievalAnswerer, DEFAULT_RETRIEVAL_TOP_K};
pub use chat::{ChatError, ChatMessage, ChatModel, ChecklistAnswer, HttpChatClient};
pub use progress::{ProgressSnapshot, RunProgress};
pub use publish::{publish, PublishError};
pub use scheduler::{process_all, DEFAULT_ANSWER_BATCH_SIZE, DEFAULT_ANSWER_MAX_WORKERS};
pub use schema::{answer_schema, validate_answer};
