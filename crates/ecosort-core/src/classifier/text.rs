//! Keyword-weighted text classifier.
//!
//! Scores a free-text description against three fixed keyword tables and
//! picks the best-scoring disposal category. Every keyword contributes
//! `len / 10 + 1` when it occurs as a substring of the lowercased input, so
//! longer, more specific keywords count for more.
//!
//! Weights are tracked in tenths as integers so ties are exact.

use std::time::Instant;

use tracing::trace;

use super::{round2, ClassificationResult, Classifier, WasteLabel};
use crate::validation::NormalizedText;

/// Label returned when nothing in the text matches a keyword.
pub const FALLBACK_LABEL: WasteLabel = WasteLabel::Recyclable;

/// Confidence reported for the fallback label.
pub const FALLBACK_CONFIDENCE: f32 = 0.30;

/// Upper bound on keyword confidence; the scorer is a heuristic, never certain.
pub const MAX_CONFIDENCE: f32 = 0.95;

const BASE_CONFIDENCE: f64 = 0.60;
const SHARE_WEIGHT: f64 = 0.35;

const RECYCLABLE_KEYWORDS: &[&str] = &[
    "plastic", "bottle", "can", "aluminum", "paper", "cardboard", "glass", "newspaper",
    "magazine", "metal", "tin", "steel", "container", "jar", "box", "packaging", "wrapper",
    "bag", "cup", "plate", "tray", "carton", "tube", "foil",
];

const BIODEGRADABLE_KEYWORDS: &[&str] = &[
    "banana", "apple", "orange", "fruit", "vegetable", "food", "organic", "compost", "leaf",
    "wood", "branch", "plant", "peel", "core", "scrap", "leftover", "garden", "yard", "flower",
    "grass", "tree", "seed", "shell", "bone",
];

const HAZARDOUS_KEYWORDS: &[&str] = &[
    "battery", "electronic", "chemical", "paint", "oil", "toxic", "medical", "needle",
    "syringe", "medicine", "drug", "acid", "cleaning", "detergent", "bleach", "pesticide",
    "solvent", "fluorescent", "bulb", "thermometer", "asbestos",
];

/// A keyword and its weight in tenths.
#[derive(Debug, Clone)]
struct WeightedKeyword {
    keyword: &'static str,
    weight: u32,
}

/// Keyword table for one label.
#[derive(Debug, Clone)]
struct LabelKeywords {
    label: WasteLabel,
    keywords: Vec<WeightedKeyword>,
}

/// Per-label breakdown of a keyword scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordScores {
    /// `(label, score in tenths, matched keywords)` in precedence order.
    pub entries: Vec<(WasteLabel, u32, Vec<&'static str>)>,
}

impl KeywordScores {
    /// Returns the score (in tenths) for `label`.
    pub fn score_for(&self, label: WasteLabel) -> u32 {
        self.entries
            .iter()
            .find(|(l, _, _)| *l == label)
            .map(|(_, s, _)| *s)
            .unwrap_or(0)
    }

    /// Sum of all label scores.
    pub fn total(&self) -> u32 {
        self.entries.iter().map(|(_, s, _)| *s).sum()
    }

    /// Highest-scoring label; ties go to the label earlier in precedence order.
    pub fn winner(&self) -> Option<(WasteLabel, u32)> {
        let mut best: Option<(WasteLabel, u32)> = None;
        for (label, score, _) in &self.entries {
            if *score == 0 {
                continue;
            }
            match best {
                Some((_, top)) if *score <= top => {}
                _ => best = Some((*label, *score)),
            }
        }
        best
    }
}

/// Deterministic keyword scorer for text descriptions.
#[derive(Debug, Clone)]
pub struct TextClassifier {
    tables: Vec<LabelKeywords>,
}

impl TextClassifier {
    /// Creates a text classifier with the built-in keyword tables.
    pub fn new() -> Self {
        let tables = WasteLabel::by_precedence()
            .iter()
            .map(|label| LabelKeywords {
                label: *label,
                keywords: Self::keywords_for(*label)
                    .iter()
                    .map(|k| WeightedKeyword {
                        keyword: k,
                        weight: k.len() as u32 + 10,
                    })
                    .collect(),
            })
            .collect();

        Self { tables }
    }

    fn keywords_for(label: WasteLabel) -> &'static [&'static str] {
        match label {
            WasteLabel::Recyclable => RECYCLABLE_KEYWORDS,
            WasteLabel::Biodegradable => BIODEGRADABLE_KEYWORDS,
            WasteLabel::Hazardous => HAZARDOUS_KEYWORDS,
        }
    }

    /// Scores `text` against every keyword table.
    pub fn score(&self, text: &str) -> KeywordScores {
        let text_lower = text.to_lowercase();

        let entries = self
            .tables
            .iter()
            .map(|table| {
                let mut score = 0;
                let mut matched = Vec::new();
                for kw in &table.keywords {
                    if text_lower.contains(kw.keyword) {
                        score += kw.weight;
                        matched.push(kw.keyword);
                    }
                }
                (table.label, score, matched)
            })
            .collect();

        KeywordScores { entries }
    }

    /// Classifies already-normalized text. Never fails.
    pub fn classify(&self, text: &NormalizedText) -> ClassificationResult {
        let start = Instant::now();
        let scores = self.score(text.as_str());

        let result = match scores.winner() {
            Some((label, top)) => {
                let share = f64::from(top) / f64::from(scores.total());
                let confidence = (BASE_CONFIDENCE + share * SHARE_WEIGHT) as f32;
                ClassificationResult::new(label, round2(confidence.min(MAX_CONFIDENCE)))
            }
            None => ClassificationResult::new(FALLBACK_LABEL, FALLBACK_CONFIDENCE),
        };

        trace!(
            label = %result.label,
            confidence = result.confidence,
            duration_us = start.elapsed().as_micros() as u64,
            "Text classified"
        );

        result
    }
}

impl Default for TextClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier<NormalizedText> for TextClassifier {
    fn classify(&self, input: &NormalizedText) -> ClassificationResult {
        TextClassifier::classify(self, input)
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
