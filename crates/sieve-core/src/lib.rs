//! Message spam classification engine.
//!
//! Deterministic text vectorization, a bag-of-features linear classifier with
//! softmax output, and a three-way threshold policy (spam / ham / unknown)
//! that maps to a filter action.
//!
//! Zero I/O: persistence and notification live in `sieve-store`.

pub mod constants;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod time;
pub mod tokenizer;
pub mod vocab;

pub use constants::{
    DEFAULT_HAM_THRESHOLD, DEFAULT_SEQUENCE_LENGTH, DEFAULT_SPAM_THRESHOLD, MAX_INPUT_BYTES,
    PROBABILITY_TOLERANCE,
};
pub use error::{CoreError, Result};
pub use model::{ClassificationResult, Model, ModelBundle, softmax};
pub use pipeline::{ClassificationInput, Evaluation, evaluate};
pub use policy::{ActionDecision, Category, FilterAction, SubAction, Thresholds, Verdict};
pub use time::{UtcTimestamp, now_display, unix_to_display};
pub use tokenizer::split_words;
pub use vocab::{TokenId, TokenVector, Vocabulary};
