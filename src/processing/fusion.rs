use std::sync::Arc;

use image::GrayImage;
use log::{debug, info, warn};

use crate::models::{FusionOutcome, PreprocessMethod, RecognitionResult};
use crate::processing::{ImageProcessor, Recognizer, WorkerPool};

/// Fixed confidence reported for the unfiltered fallback pass.
pub const FALLBACK_CONFIDENCE: f64 = 50.0;

/// Shortest trimmed text (exclusive) a method must produce to compete.
const MIN_TEXT_LEN: usize = 10;

/// Runs every preprocessing variant through the recognizer and keeps the best.
pub struct RecognitionFuser {
    recognizer: Arc<dyn Recognizer>,
    pool: Arc<WorkerPool>,
}

impl RecognitionFuser {
    pub fn new(recognizer: Arc<dyn Recognizer>, pool: Arc<WorkerPool>) -> Self {
        RecognitionFuser { recognizer, pool }
    }

    /// Decode raw image bytes and fuse them. Undecodable input yields an empty outcome.
    pub fn fuse_image(&self, image_bytes: &[u8]) -> FusionOutcome {
        match ImageProcessor::load_grayscale(image_bytes) {
            Ok(gray) => self
                .fuse_pages(vec![gray])
                .pop()
                .unwrap_or_else(FusionOutcome::empty),
            Err(e) => {
                warn!("Skipping recognition: {}", e);
                FusionOutcome::empty()
            }
        }
    }

    /// Fuse several independent page images. Every page x method pair is one
    /// pool job that renders its variant and recognizes it, so pages and
    /// methods share the same bounded batch.
    pub fn fuse_pages(&self, pages: Vec<GrayImage>) -> Vec<FusionOutcome> {
        let pages: Vec<Arc<GrayImage>> = pages.into_iter().map(Arc::new).collect();
        let mut tags = Vec::new();
        let mut jobs = Vec::new();
        for (page, gray) in pages.iter().enumerate() {
            for &method in PreprocessMethod::ORDERED.iter() {
                tags.push((page, method));
                let recognizer = Arc::clone(&self.recognizer);
                let gray = Arc::clone(gray);
                jobs.push(move || {
                    let candidate = ImageProcessor::candidate(&gray, method);
                    recognizer.recognize(&candidate.image)
                });
            }
        }

        let mut per_page: Vec<Vec<RecognitionResult>> = vec![Vec::new(); pages.len()];
        for ((page, method), output) in tags.into_iter().zip(self.pool.run_all(jobs)) {
            let result = match output {
                Ok(output) => {
                    let confidence = output.mean_confidence();
                    RecognitionResult::new(output.text, confidence, method)
                }
                Err(e) => {
                    warn!("Method '{}' failed on page {}: {}", method, page, e);
                    RecognitionResult::failed(method)
                }
            };
            debug!(
                "Method '{}' on page {}: {:.1}% confidence, {} words",
                method, page, result.confidence, result.word_count
            );
            per_page[page].push(result);
        }

        let mut outcomes: Vec<Option<FusionOutcome>> = per_page
            .iter()
            .map(|results| {
                Self::select_best(results).map(|best| FusionOutcome {
                    text: best.text.clone(),
                    confidence: best.confidence,
                    methods_tried: results.len(),
                    results: results.clone(),
                })
            })
            .collect();

        let fallback_pages: Vec<usize> = (0..pages.len())
            .filter(|&page| outcomes[page].is_none())
            .collect();
        let fallback_jobs: Vec<_> = fallback_pages
            .iter()
            .map(|&page| {
                let recognizer = Arc::clone(&self.recognizer);
                let gray = Arc::clone(&pages[page]);
                move || recognizer.recognize(&gray)
            })
            .collect();

        for (page, output) in fallback_pages.into_iter().zip(self.pool.run_all(fallback_jobs)) {
            let mut results = std::mem::take(&mut per_page[page]);
            let fallback = match output {
                Ok(output) => {
                    let text = output.text.trim().to_string();
                    let confidence = if text.is_empty() { 0.0 } else { FALLBACK_CONFIDENCE };
                    RecognitionResult::new(text, confidence, PreprocessMethod::Fallback)
                }
                Err(e) => {
                    warn!("Fallback recognition failed on page {}: {}", page, e);
                    RecognitionResult::failed(PreprocessMethod::Fallback)
                }
            };
            info!("No method qualified on page {}, using unfiltered pass", page);
            results.push(fallback.clone());
            outcomes[page] = Some(FusionOutcome {
                text: fallback.text,
                confidence: fallback.confidence,
                methods_tried: results.len(),
                results,
            });
        }

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(FusionOutcome::empty))
            .collect()
    }

    /// Strictly highest positive confidence among results with enough text;
    /// earlier methods win ties.
    pub fn select_best(results: &[RecognitionResult]) -> Option<&RecognitionResult> {
        let mut best: Option<&RecognitionResult> = None;
        let mut best_confidence = 0.0;
        for result in results {
            if result.text.trim().chars().count() > MIN_TEXT_LEN && result.confidence > best_confidence {
                best_confidence = result.confidence;
                best = Some(result);
            }
        }
        best
    }
}
