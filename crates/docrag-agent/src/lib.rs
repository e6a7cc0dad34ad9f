pub mod orchestrator;
pub mod prompt;

pub use orchestrator::{InitOutcome, RetrievalOrchestrator, Status};
pub use prompt::EMPTY_CORPUS_RESPONSE;
