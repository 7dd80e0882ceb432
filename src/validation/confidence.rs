use log::debug;

use crate::models::{is_filled, ParsedFields, ScoringConfig};

/// Blends recognition confidence with how complete the parsed fields are.
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        ConfidenceScorer { config }
    }

    /// Score in [0, 100], rounded to two decimals.
    pub fn score(&self, fields: &ParsedFields, ocr_confidence: f64) -> f64 {
        let c = &self.config;
        let completeness = fields.filled_count() as f64 / ParsedFields::FIELD_COUNT as f64 * 100.0;
        let critical =
            fields.critical_filled_count() as f64 / ParsedFields::CRITICAL_COUNT as f64 * 100.0;

        let mut score =
            c.ocr_weight * ocr_confidence + c.completeness_weight * completeness + c.critical_weight * critical;

        if fields
            .graduation_year_value()
            .map_or(false, |y| (c.bonus_year_min..=c.bonus_year_max).contains(&y))
        {
            score += c.bonus;
        }
        if is_filled(&fields.grade) {
            score += c.bonus;
        }
        if fields
            .roll_number
            .as_deref()
            .map_or(false, |r| r.trim().chars().count() >= c.min_roll_number_len)
        {
            score += c.bonus;
        }

        let score = (score.min(100.0) * 100.0).round() / 100.0;
        debug!(
            "Extraction confidence {:.2} (ocr {:.1}, {} of {} fields)",
            score,
            ocr_confidence,
            fields.filled_count(),
            ParsedFields::FIELD_COUNT
        );
        score
    }
}
