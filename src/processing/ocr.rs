use std::io::Write;

use image::GrayImage;
use log::debug;
use tempfile::NamedTempFile;
use tesseract::Tesseract;

use crate::models::OcrConfig;
use crate::processing::ImageProcessor;
use crate::utils::{CertificateError, Result};

/// Raw recognizer output: the text plus one confidence per TSV row.
/// Rows that are not words report a non-positive confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognizerOutput {
    pub text: String,
    pub token_confidences: Vec<f32>,
}

impl RecognizerOutput {
    /// Mean of the positive token confidences, 0 when there are none.
    pub fn mean_confidence(&self) -> f64 {
        let positive: Vec<f64> = self
            .token_confidences
            .iter()
            .filter(|&&c| c > 0.0)
            .map(|&c| c as f64)
            .collect();
        if positive.is_empty() {
            0.0
        } else {
            positive.iter().sum::<f64>() / positive.len() as f64
        }
    }
}

/// Text recognition engine seen as a black box.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<RecognizerOutput>;
}

/// Tesseract-backed recognizer. A fresh engine is created per call so calls
/// can run concurrently on the worker pool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    language: String,
    datapath: Option<String>,
    char_whitelist: Option<String>,
}

impl TesseractRecognizer {
    pub fn new(config: &OcrConfig) -> Self {
        TesseractRecognizer {
            language: config.language.clone(),
            datapath: config.datapath.clone(),
            char_whitelist: config.char_whitelist.clone(),
        }
    }

    fn parse_tsv_confidences(tsv: &str) -> Vec<f32> {
        // level page block par line word left top width height conf text
        tsv.lines()
            .filter_map(|line| line.split('\t').nth(10))
            .filter_map(|conf| conf.trim().parse::<f32>().ok())
            .collect()
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<RecognizerOutput> {
        let png = ImageProcessor::encode_png(image)?;

        let mut temp_file = NamedTempFile::new()
            .map_err(|e| CertificateError::Recognition(format!("Failed to create temp file: {}", e)))?;
        temp_file
            .write_all(&png)
            .map_err(|e| CertificateError::Recognition(format!("Failed to write temp file: {}", e)))?;
        let image_path = temp_file.path().to_str().ok_or_else(|| {
            CertificateError::Recognition("Failed to convert path to string".to_string())
        })?;

        let mut tess = Tesseract::new(self.datapath.as_deref(), Some(self.language.as_str()))
            .map_err(|e| CertificateError::Recognition(format!("Tesseract init error: {}", e)))?;
        if let Some(whitelist) = &self.char_whitelist {
            tess = tess
                .set_variable("tessedit_char_whitelist", whitelist)
                .map_err(|e| CertificateError::Recognition(format!("Tesseract set variable error: {}", e)))?;
        }
        let mut tess = tess
            .set_image(image_path)
            .map_err(|e| CertificateError::Recognition(format!("Tesseract set image error: {}", e)))?
            .recognize()
            .map_err(|e| CertificateError::Recognition(format!("Tesseract recognize error: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| CertificateError::Recognition(format!("Tesseract error: {}", e)))?;
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| CertificateError::Recognition(format!("Tesseract TSV error: {}", e)))?;

        let token_confidences = Self::parse_tsv_confidences(&tsv);
        debug!(
            "Recognized {} chars, {} TSV rows",
            text.len(),
            token_confidences.len()
        );
        Ok(RecognizerOutput {
            text,
            token_confidences,
        })
    }
}
