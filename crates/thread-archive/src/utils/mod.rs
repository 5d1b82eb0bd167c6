//! Utilities module - token estimation and text processing for full-text queries

pub mod text_utils;
pub mod token_estimator;

pub use text_utils::TextUtils;
pub use token_estimator::{estimate_batch_tokens, estimate_message_tokens, sum_tokens, CHARS_PER_TOKEN};
