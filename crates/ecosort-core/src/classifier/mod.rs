//! Waste classification.
//!
//! Both classifiers are deterministic, rule-based scorers behind the same
//! [`Classifier`] strategy trait, so either can be replaced (for example by
//! a learned model) without touching validation or admission control.

mod image;
mod label;
mod text;

pub use image::{ImageClassifier, ImageSignals};
pub use label::{ClassificationResult, WasteLabel};
pub(crate) use label::round2;
pub use text::{KeywordScores, TextClassifier, FALLBACK_CONFIDENCE, FALLBACK_LABEL, MAX_CONFIDENCE};

/// Strategy interface shared by every classifier.
///
/// Implementations must be total over their normalized input: once input has
/// passed validation, `classify` always produces a result.
pub trait Classifier<Input: ?Sized>: Send + Sync {
    /// Classifies the given input.
    fn classify(&self, input: &Input) -> ClassificationResult;

    /// Returns the name of this classifier for logging/debugging.
    fn name(&self) -> &'static str;
}
