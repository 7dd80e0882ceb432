use std::path::Path;
use std::time::Duration;

use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};

use crate::utils::{CertificateError, Result};

/// Earliest graduation year accepted anywhere in the pipeline.
pub const MIN_GRADUATION_YEAR: i32 = 1950;

/// Recognizer and worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub language: String,
    pub datapath: Option<String>,
    pub char_whitelist: Option<String>,
    pub timeout_ms: u64,
    /// Worker threads for recognition; `None` uses the available parallelism.
    pub workers: Option<usize>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            language: "eng".to_string(),
            datapath: None,
            char_whitelist: Some(
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,:-/()[]%+ "
                    .to_string(),
            ),
            timeout_ms: 30_000,
            workers: None,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Weights and cut-offs used by the candidate matcher and status classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub name_weight: f64,
    pub institution_weight: f64,
    pub year_weight: f64,
    pub course_weight: f64,
    /// Year difference at which the year component reaches zero.
    pub year_tolerance: f64,
    /// Best match must be strictly above this to be accepted.
    pub acceptance_threshold: f64,
    pub valid_threshold: f64,
    pub likely_valid_threshold: f64,
    pub suspicious_threshold: f64,
    /// Name-search hits at or below this similarity are dropped.
    pub name_search_min_score: f64,
    pub discrepancy_year_tolerance: i32,
    pub invalid_fields_confidence: f64,
    pub not_found_confidence: f64,
    pub no_strong_match_confidence: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            name_weight: 0.4,
            institution_weight: 0.3,
            year_weight: 0.2,
            course_weight: 0.1,
            year_tolerance: 5.0,
            acceptance_threshold: 0.6,
            valid_threshold: 0.9,
            likely_valid_threshold: 0.7,
            suspicious_threshold: 0.5,
            name_search_min_score: 0.5,
            discrepancy_year_tolerance: 1,
            invalid_fields_confidence: 20.0,
            not_found_confidence: 25.0,
            no_strong_match_confidence: 40.0,
        }
    }
}

/// Weights for blending recognition confidence with field completeness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub ocr_weight: f64,
    pub completeness_weight: f64,
    pub critical_weight: f64,
    pub bonus: f64,
    pub bonus_year_min: i32,
    pub bonus_year_max: i32,
    pub min_roll_number_len: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            ocr_weight: 0.4,
            completeness_weight: 0.3,
            critical_weight: 0.3,
            bonus: 5.0,
            bonus_year_min: MIN_GRADUATION_YEAR,
            bonus_year_max: 2030,
            min_roll_number_len: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub ocr: OcrConfig,
    pub matching: MatchingConfig,
    pub scoring: ScoringConfig,
    /// Fixes the calendar year used by year checks; local year when unset.
    pub current_year: Option<i32>,
}

impl ValidatorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CertificateError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: ValidatorConfig = serde_json::from_str(&raw)?;
        config.check()?;
        Ok(config)
    }

    pub fn current_year(&self) -> i32 {
        self.current_year.unwrap_or_else(|| Local::now().year())
    }

    fn check(&self) -> Result<()> {
        let m = &self.matching;
        let weights = m.name_weight + m.institution_weight + m.year_weight + m.course_weight;
        if (weights - 1.0).abs() > 1e-6 {
            return Err(CertificateError::Config(format!(
                "matching weights must sum to 1.0, got {}",
                weights
            )));
        }
        if m.year_tolerance <= 0.0 {
            return Err(CertificateError::Config(
                "year_tolerance must be positive".to_string(),
            ));
        }
        if self.ocr.timeout_ms == 0 {
            return Err(CertificateError::Config(
                "ocr.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
