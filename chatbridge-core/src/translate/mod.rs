//! Translation of provider replies back into OpenAI shapes
//!
//! Event streams go through [`stream::StreamTranslator`]; complete
//! documents through [`normalize::normalize`].

pub mod normalize;
pub mod sse;
pub mod stream;

pub use normalize::{completion_to_events, normalize, Normalized, NormalizationFailure};
pub use sse::{encode_frame, parse_data_line, DONE_FRAME};
pub use stream::{translate_lines, OutputMode, StreamTranslator, TranslatorEvent, TranslatorState};
