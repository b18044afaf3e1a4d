//! Optical character recognition.
//!
//! [`TextExtractor`] wraps an [`OcrEngine`] and applies the pure
//! post-processing in [`normalize_ocr_text`].

mod engine;
mod extractor;
mod normalize;

pub use engine::{OcrEngine, OcrEngineFactory, OcrError, RawRecognition};
pub use extractor::{OcrConfig, TextExtractor};
pub use normalize::normalize_ocr_text;
