use std::fs;
use std::io::Write;
use std::process::Command;
use std::sync::Arc;

use image::GrayImage;
use log::{debug, info, warn};
use tempfile::{NamedTempFile, TempDir};

use crate::models::{DocumentKind, ExtractedText, RawDocument};
use crate::processing::{ImageProcessor, RecognitionFuser};
use crate::utils::{CertificateError, Result};

/// Trust tier for text read straight from an embedded text layer.
pub const TEXT_LAYER_CONFIDENCE: f64 = 95.0;
/// Trust tier for text recognized from rasterized pages.
pub const RASTERIZED_CONFIDENCE: f64 = 80.0;

pub const DEFAULT_DPI: u32 = 300;

/// Reads the embedded text of every page of a paged document.
pub trait TextLayerSource: Send + Sync {
    fn extract_embedded_text(&self, document: &[u8]) -> Result<String>;
}

/// Renders every page of a paged document to a grayscale image.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, document: &[u8]) -> Result<Vec<GrayImage>>;
}

/// Poppler command line tools (`pdftotext`, `pdftoppm`).
#[derive(Debug, Clone)]
pub struct PopplerPdf {
    dpi: u32,
}

impl Default for PopplerPdf {
    fn default() -> Self {
        PopplerPdf::new(DEFAULT_DPI)
    }
}

impl PopplerPdf {
    pub fn new(dpi: u32) -> Self {
        PopplerPdf { dpi }
    }

    fn spill(document: &[u8]) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(document)?;
        file.flush()?;
        Ok(file)
    }

    /// pdftotext separates pages with form feeds.
    fn join_pages(raw: &str) -> String {
        raw.split('\x0c')
            .map(str::trim)
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TextLayerSource for PopplerPdf {
    fn extract_embedded_text(&self, document: &[u8]) -> Result<String> {
        let pdf = Self::spill(document)?;
        let output = Command::new("pdftotext")
            .arg("-layout")
            .arg(pdf.path())
            .arg("-")
            .output()
            .map_err(|e| {
                CertificateError::PdfExtraction(format!(
                    "failed to invoke pdftotext; is poppler-utils installed? {}",
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(CertificateError::PdfExtraction(format!(
                "pdftotext failed with status: {}",
                output.status
            )));
        }
        Ok(Self::join_pages(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl PageRasterizer for PopplerPdf {
    fn rasterize(&self, document: &[u8]) -> Result<Vec<GrayImage>> {
        let pdf = Self::spill(document)?;
        let out_dir = TempDir::new()?;
        let prefix = out_dir.path().join("page");

        let status = Command::new("pdftoppm")
            .arg("-gray")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf.path())
            .arg(&prefix)
            .status()
            .map_err(|e| {
                CertificateError::PdfExtraction(format!(
                    "failed to invoke pdftoppm; is poppler-utils installed? {}",
                    e
                ))
            })?;
        if !status.success() {
            return Err(CertificateError::PdfExtraction(format!(
                "pdftoppm failed with status: {}",
                status
            )));
        }

        // page-1.png, page-2.png ... are zero padded to a common width, so
        // lexical order is page order.
        let mut paths: Vec<_> = fs::read_dir(out_dir.path())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext == "png"))
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| ImageProcessor::load_grayscale(&fs::read(path)?))
            .collect()
    }
}

/// Turns any supported document into text plus an aggregate confidence.
pub struct DocumentResolver {
    fuser: RecognitionFuser,
    text_layer: Arc<dyn TextLayerSource>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl DocumentResolver {
    pub fn new(
        fuser: RecognitionFuser,
        text_layer: Arc<dyn TextLayerSource>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        DocumentResolver {
            fuser,
            text_layer,
            rasterizer,
        }
    }

    /// Never fails: unreadable input resolves to empty text at confidence 0.
    pub fn resolve(&self, document: &RawDocument) -> ExtractedText {
        match document.kind {
            DocumentKind::Image(kind) => {
                debug!("Resolving {:?} image ({} bytes)", kind, document.content.len());
                let outcome = self.fuser.fuse_image(&document.content);
                ExtractedText {
                    text: outcome.text,
                    confidence: outcome.confidence,
                    methods_tried: outcome.methods_tried,
                }
            }
            DocumentKind::Paged => self.resolve_paged(&document.content),
        }
    }

    fn resolve_paged(&self, content: &[u8]) -> ExtractedText {
        match self.text_layer.extract_embedded_text(content) {
            Ok(text) if !text.trim().is_empty() => {
                info!("Using embedded text layer ({} chars)", text.len());
                return ExtractedText {
                    text,
                    confidence: TEXT_LAYER_CONFIDENCE,
                    methods_tried: 0,
                };
            }
            Ok(_) => debug!("No embedded text layer, rasterizing pages"),
            Err(e) => warn!("Text layer extraction failed: {}", e),
        }

        let pages = match self.rasterizer.rasterize(content) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Page rasterization failed: {}", e);
                return ExtractedText::empty();
            }
        };
        info!("Recognizing {} rasterized page(s)", pages.len());

        let outcomes = self.fuser.fuse_pages(pages);
        let methods_tried = outcomes.iter().map(|o| o.methods_tried).sum();
        let text = outcomes
            .into_iter()
            .map(|o| o.text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let confidence = if text.trim().is_empty() {
            0.0
        } else {
            RASTERIZED_CONFIDENCE
        };
        ExtractedText {
            text,
            confidence,
            methods_tried,
        }
    }
}
