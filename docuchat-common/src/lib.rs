//! DocuChat Common Types
//!
//! Shared types used by the BFF and its sibling services: the model-stream
//! chunk protocol and the persisted answer model.

pub mod answer;
pub mod stream;

pub use answer::AnswerRecord;
pub use stream::{CompletedAnswer, FinalAnswer, RelayEvent, StreamChunk};
