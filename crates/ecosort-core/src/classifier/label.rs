//! Waste labels and classification results.

use serde::{Deserialize, Serialize};

/// Disposal categories an item can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteLabel {
    /// Paper, glass, metal, and plastics that go in the recycling bin.
    Recyclable,
    /// Food scraps and garden waste suitable for composting.
    Biodegradable,
    /// Batteries, chemicals, and medical waste needing special collection.
    Hazardous,
}

impl WasteLabel {
    /// Returns all labels in tie-break precedence order (highest first).
    ///
    /// Hazardous wins ties because misclassifying it is the costliest mistake.
    pub fn by_precedence() -> &'static [WasteLabel] {
        &[
            WasteLabel::Hazardous,
            WasteLabel::Recyclable,
            WasteLabel::Biodegradable,
        ]
    }

    /// Returns the wire name of this label.
    pub fn as_str(&self) -> &'static str {
        match self {
            WasteLabel::Recyclable => "recyclable",
            WasteLabel::Biodegradable => "biodegradable",
            WasteLabel::Hazardous => "hazardous",
        }
    }

    /// Returns the canonical disposal tip for this label.
    pub fn disposal_tip(&self) -> &'static str {
        match self {
            WasteLabel::Recyclable => {
                "Clean the item and place it in the recycling bin. Remove any non-recyclable parts like caps or labels if possible."
            }
            WasteLabel::Biodegradable => {
                "Compost this item in your garden compost bin or municipal composting facility. It will break down naturally and enrich the soil."
            }
            WasteLabel::Hazardous => {
                "Take this item to a specialized hazardous waste collection center. Do not put it in regular trash as it can harm the environment."
            }
        }
    }
}

impl std::fmt::Display for WasteLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for a single classification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// The winning disposal category.
    pub label: WasteLabel,
    /// Confidence score (0.0 to 1.0).
    pub confidence: f32,
    /// Disposal guidance for the label.
    pub tip: String,
}

impl ClassificationResult {
    /// Creates a result for `label`, clamping confidence and attaching the canonical tip.
    pub fn new(label: WasteLabel, confidence: f32) -> Self {
        Self {
            label,
            confidence: round2(confidence.clamp(0.0, 1.0)),
            tip: label.disposal_tip().to_string(),
        }
    }
}

/// Rounds to two decimal places, the precision reported on the wire.
pub(crate) fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
