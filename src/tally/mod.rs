//! Tally forms API client and response normalization.
//!
//! Submissions are fetched page by page, and every answer is coerced into
//! a [`NormalizedAnswer`] whose value is one of text, number, boolean,
//! string list or null.

mod client;
mod normalize;
mod types;

pub use client::{FetchOptions, TallyClient};
pub use normalize::{
    coerce_value, format_number, normalize_answer, normalize_submission, parse_timestamp,
    question_metadata, QuestionMap,
};
pub use types::*;
