// StyleShift Core Services
// Segmentation, completion client, stage policy and session orchestration

pub mod text_processor;
pub mod think_filter;
pub mod observer;
pub mod providers;
pub mod prompts;
pub mod composer;
pub mod history;
pub mod pipeline;
pub mod config_store;
pub mod document;

#[cfg(test)]
pub(crate) mod testing;

pub use text_processor::*;
pub use think_filter::{filter_thinking, strip_thinking_tags, ThinkFilter};
pub use observer::{CompletionEvent, CompletionObserver, NoopObserver, TracingObserver};
pub use providers::*;
pub use composer::{process, PromptComposer, StageOutput};
pub use history::{compact_history, compress, CompressionPolicy};
pub use pipeline::{Progress, RunReport, SessionRunner, StageReport};
pub use config_store::*;
