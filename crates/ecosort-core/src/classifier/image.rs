//! Heuristic image classifier.
//!
//! A stand-in for a learned vision model. It derives a handful of cheap
//! signals from a validated image (dimensions, aspect ratio, and the mean
//! color of a small thumbnail) and maps them through fixed rules. The output
//! is fully deterministic.
//!
//! Rules, first match wins:
//!
//! Color statistics are only computed for images within a small pixel
//! budget; larger images are classified from their dimensions alone.
//!
//! 1. Vegetation or earth-toned palette → Biodegradable
//! 2. Saturated warning colors (red/orange/yellow) → Hazardous
//! 3. Wide aspect ratio (packaging shots) → Recyclable, 0.80
//! 4. Large image (over one megapixel) → Recyclable, 0.70
//! 5. Anything else → Recyclable, 0.60

use std::io::Cursor;
use std::time::Instant;

use tracing::{debug, trace};

use super::{ClassificationResult, Classifier, WasteLabel};
use crate::validation::NormalizedImage;

/// Edge length of the thumbnail used for color statistics.
const THUMBNAIL_SIZE: u32 = 32;

/// Images above this many pixels are never decoded for color statistics.
pub const COLOR_PIXEL_BUDGET: u64 = 4_000_000;

/// Allocation cap for a single decode (budget pixels at 4 bytes each).
const DECODE_MAX_ALLOC: u64 = COLOR_PIXEL_BUDGET * 4;

/// Images above this many pixels count as "large".
const LARGE_IMAGE_PIXELS: u64 = 1_000_000;

/// Aspect ratios above this count as "wide".
const WIDE_ASPECT_RATIO: f32 = 2.0;

/// Signals extracted from an image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSignals {
    pub width: u32,
    pub height: u32,
    /// Width divided by height (>= 1 means landscape).
    pub aspect_ratio: f32,
    /// Mean RGB over a thumbnail, if the image was within the color budget
    /// and its pixel data decoded.
    pub mean_rgb: Option<[u8; 3]>,
}

impl ImageSignals {
    /// Extracts signals from a validated image.
    pub fn extract(image: &NormalizedImage) -> Self {
        let width = image.width();
        let height = image.height();
        let aspect_ratio = if height > 0 {
            width as f32 / height as f32
        } else {
            1.0
        };

        Self {
            width,
            height,
            aspect_ratio,
            mean_rgb: None,
        }
        .with_color(image)
    }

    fn with_color(mut self, image: &NormalizedImage) -> Self {
        if self.pixel_count() > COLOR_PIXEL_BUDGET {
            debug!(
                width = self.width,
                height = self.height,
                "Image over color budget, using metadata only"
            );
        } else {
            self.mean_rgb = mean_color(image);
        }
        self
    }

    fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Decodes the image under an allocation cap and averages a thumbnail.
/// Decoding failures yield `None`.
fn mean_color(image: &NormalizedImage) -> Option<[u8; 3]> {
    let mut limits = ::image::Limits::default();
    limits.max_alloc = Some(DECODE_MAX_ALLOC);

    let mut reader =
        ::image::ImageReader::with_format(Cursor::new(image.bytes()), image.mime().image_format());
    reader.limits(limits);

    let decoded = match reader.decode() {
        Ok(img) => img,
        Err(e) => {
            debug!(error = %e, "Image pixels not decodable, using metadata only");
            return None;
        }
    };

    let thumb = decoded.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgb8();
    let count = u64::from(thumb.width()) * u64::from(thumb.height());
    if count == 0 {
        return None;
    }

    let mut sums = [0u64; 3];
    for pixel in thumb.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0.iter()) {
            *sum += u64::from(*channel);
        }
    }

    Some([
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ])
}

/// Green clearly ahead of red and blue.
fn green_dominance([r, g, b]: [u8; 3]) -> Option<u8> {
    let (r, g, b) = (i16::from(r), i16::from(g), i16::from(b));
    let lead = g - r.max(b);
    (lead >= 20).then_some(lead as u8)
}

/// Brown/earth tones: red over green over blue, moderately dark, low blue.
fn is_earth_tone([r, g, b]: [u8; 3]) -> bool {
    r > g && g > b && r - b >= 40 && r <= 200 && b <= 100
}

/// Saturated warm warning colors; returns saturation (max - min).
fn warning_saturation([r, g, b]: [u8; 3]) -> Option<u8> {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let saturation = max - min;
    let warm = r >= 180 && b <= 90 && r >= g;
    (warm && saturation >= 120).then_some(saturation)
}

/// Deterministic rule-based image classifier.
#[derive(Debug, Clone, Default)]
pub struct ImageClassifier;

impl ImageClassifier {
    /// Creates a new heuristic image classifier.
    pub fn new() -> Self {
        Self
    }

    /// Maps extracted signals to a verdict.
    pub fn classify_signals(&self, signals: &ImageSignals) -> ClassificationResult {
        if let Some(rgb) = signals.mean_rgb {
            if let Some(lead) = green_dominance(rgb) {
                let confidence = 0.65 + (f32::from(lead) / 255.0) * 0.15;
                return ClassificationResult::new(WasteLabel::Biodegradable, confidence.min(0.80));
            }
            if is_earth_tone(rgb) {
                return ClassificationResult::new(WasteLabel::Biodegradable, 0.65);
            }
            if let Some(saturation) = warning_saturation(rgb) {
                let confidence = 0.60 + (f32::from(saturation) / 255.0) * 0.15;
                return ClassificationResult::new(WasteLabel::Hazardous, confidence.min(0.75));
            }
        }

        if signals.aspect_ratio > WIDE_ASPECT_RATIO {
            return ClassificationResult::new(WasteLabel::Recyclable, 0.80);
        }

        if signals.pixel_count() > LARGE_IMAGE_PIXELS {
            return ClassificationResult::new(WasteLabel::Recyclable, 0.70);
        }

        ClassificationResult::new(WasteLabel::Recyclable, 0.60)
    }

    /// Classifies a validated image. Never fails.
    pub fn classify(&self, image: &NormalizedImage) -> ClassificationResult {
        let start = Instant::now();
        let signals = ImageSignals::extract(image);
        let result = self.classify_signals(&signals);

        trace!(
            width = signals.width,
            height = signals.height,
            mean_rgb = ?signals.mean_rgb,
            label = %result.label,
            confidence = result.confidence,
            duration_us = start.elapsed().as_micros() as u64,
            "Image classified"
        );

        result
    }
}

impl Classifier<NormalizedImage> for ImageClassifier {
    fn classify(&self, input: &NormalizedImage) -> ClassificationResult {
        ImageClassifier::classify(self, input)
    }

    fn name(&self) -> &'static str {
        "image-heuristic"
    }
}
