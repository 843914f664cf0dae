pub mod backend;
pub mod gemini;
pub mod orchestrator;
pub mod prompts;
pub mod trace;

pub use backend::{RetryPolicy, Sleeper, ThreadSleeper, TranslationBackend};
pub use orchestrator::{AttemptOutcome, Translator};
pub use prompts::PromptContext;
