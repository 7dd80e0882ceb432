use std::path::Path;
use std::sync::Arc;

use log::{error, info, warn};

use crate::models::{
    AuditEntry, DocumentKind, MatchOutcome, ParsedFields, RawDocument, RequestContext,
    ValidationStatus, ValidationVerdict, ValidatorConfig,
};
use crate::processing::{
    DocumentResolver, FieldParser, PageRasterizer, PopplerPdf, RecognitionFuser, Recognizer,
    TesseractRecognizer, TextLayerSource, WorkerPool,
};
use crate::utils::Result;
use crate::validation::{AuditLog, CandidateMatcher, ConfidenceScorer, Registry};

/// Drives a document through text resolution, field parsing, scoring and
/// registry matching, and records every verdict in the audit log.
pub struct CertificateValidator {
    resolver: DocumentResolver,
    parser: FieldParser,
    scorer: ConfidenceScorer,
    matcher: CandidateMatcher,
    registry: Arc<dyn Registry>,
    audit_log: Arc<dyn AuditLog>,
    current_year: i32,
}

impl CertificateValidator {
    /// Validator backed by Tesseract and the poppler command line tools.
    pub fn new(
        config: &ValidatorConfig,
        registry: Arc<dyn Registry>,
        audit_log: Arc<dyn AuditLog>,
    ) -> Result<Self> {
        let pdf = Arc::new(PopplerPdf::default());
        Self::with_components(
            config,
            Arc::new(TesseractRecognizer::new(&config.ocr)),
            pdf.clone(),
            pdf,
            registry,
            audit_log,
        )
    }

    pub fn with_components(
        config: &ValidatorConfig,
        recognizer: Arc<dyn Recognizer>,
        text_layer: Arc<dyn TextLayerSource>,
        rasterizer: Arc<dyn PageRasterizer>,
        registry: Arc<dyn Registry>,
        audit_log: Arc<dyn AuditLog>,
    ) -> Result<Self> {
        let pool = Arc::new(WorkerPool::new(config.ocr.workers, config.ocr.timeout())?);
        let fuser = RecognitionFuser::new(recognizer, pool);
        let current_year = config.current_year();
        Ok(CertificateValidator {
            resolver: DocumentResolver::new(fuser, text_layer, rasterizer),
            parser: FieldParser::new(current_year),
            scorer: ConfidenceScorer::new(config.scoring.clone()),
            matcher: CandidateMatcher::new(config.matching.clone()),
            registry,
            audit_log,
            current_year,
        })
    }

    /// Read a file, derive its kind from the extension and validate it.
    /// Unsupported extensions are rejected before anything else runs.
    pub fn validate_file(&self, path: &Path, verified_by: &str) -> Result<ValidationVerdict> {
        let kind = DocumentKind::from_path(path)?;
        let content = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document = RawDocument::new(content, kind).with_file_name(file_name);
        let context = document.request_context(verified_by);
        Ok(self.validate_document(&document, &context))
    }

    pub fn validate_document(&self, document: &RawDocument, context: &RequestContext) -> ValidationVerdict {
        let extracted = self.resolver.resolve(document);
        info!(
            "Extracted {} chars at {:.1}% confidence ({} methods)",
            extracted.text.len(),
            extracted.confidence,
            extracted.methods_tried
        );
        let fields = self.parser.parse(&extracted.text);
        self.validate_fields(fields, extracted.confidence, extracted.methods_tried, context)
    }

    /// Validate text that was already extracted elsewhere.
    pub fn validate_text(&self, text: &str, ocr_confidence: f64, context: &RequestContext) -> ValidationVerdict {
        let fields = self.parser.parse(text);
        self.validate_fields(fields, ocr_confidence, 0, context)
    }

    pub fn validate_fields(
        &self,
        fields: ParsedFields,
        ocr_confidence: f64,
        methods_tried: usize,
        context: &RequestContext,
    ) -> ValidationVerdict {
        let extraction_confidence = self.scorer.score(&fields, ocr_confidence);

        let outcome = match self
            .matcher
            .match_fields(&fields, self.registry.as_ref(), self.current_year)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Registry lookup failed: {}", e);
                MatchOutcome::terminal(
                    ValidationStatus::Error,
                    0.0,
                    vec![format!("Validation error: {}", e)],
                )
            }
        };

        let audit_id = match self
            .audit_log
            .append(AuditEntry::new(&fields, &outcome, context))
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to record audit entry: {}", e);
                None
            }
        };

        info!(
            "Verdict: {} ({:.2}%), {} issue(s)",
            outcome.status,
            outcome.confidence_score,
            outcome.issues.len()
        );

        ValidationVerdict {
            status: outcome.status,
            confidence_score: outcome.confidence_score,
            matched_details: outcome.matched_details,
            issues: outcome.issues,
            extracted_fields: fields,
            ocr_confidence,
            extraction_confidence,
            methods_tried,
            audit_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageKind, RegistryRecord};
    use crate::processing::fusion::tests::{output, ScriptedRecognizer};
    use crate::processing::ImageProcessor;
    use crate::utils::CertificateError;
    use crate::validation::database::tests::record;
    use crate::validation::{InMemoryRegistry, MemoryAuditLog};
    use image::{GrayImage, Luma};

    struct NoPdf;

    impl TextLayerSource for NoPdf {
        fn extract_embedded_text(&self, _document: &[u8]) -> Result<String> {
            Ok(String::new())
        }
    }

    impl PageRasterizer for NoPdf {
        fn rasterize(&self, _document: &[u8]) -> Result<Vec<GrayImage>> {
            Ok(Vec::new())
        }
    }

    struct DownRegistry;

    impl Registry for DownRegistry {
        fn find_by_certificate_number(&self, _n: &str) -> Result<Option<RegistryRecord>> {
            Err(CertificateError::RegistryUnavailable("timeout".to_string()))
        }

        fn find_by_name_like(&self, _n: &str) -> Result<Vec<RegistryRecord>> {
            Err(CertificateError::RegistryUnavailable("timeout".to_string()))
        }
    }

    struct BrokenAudit;

    impl AuditLog for BrokenAudit {
        fn append(&self, _entry: AuditEntry) -> Result<u64> {
            Err(CertificateError::Audit("disk full".to_string()))
        }
    }

    const SCENARIO_TEXT: &str =
        "Ranchi University\nName: John Doe Certificate No: RU2023001 Year: 2023";

    fn config() -> ValidatorConfig {
        ValidatorConfig {
            current_year: Some(2024),
            ..Default::default()
        }
    }

    fn validator_with(
        recognizer: Arc<dyn Recognizer>,
        registry: Arc<dyn Registry>,
        audit_log: Arc<dyn AuditLog>,
    ) -> CertificateValidator {
        let pdf = Arc::new(NoPdf);
        CertificateValidator::with_components(&config(), recognizer, pdf.clone(), pdf, registry, audit_log)
            .unwrap()
    }

    fn validator(registry: Vec<RegistryRecord>, audit_log: Arc<MemoryAuditLog>) -> CertificateValidator {
        validator_with(
            Arc::new(ScriptedRecognizer::new(Vec::new())),
            Arc::new(InMemoryRegistry::new(registry)),
            audit_log,
        )
    }

    #[test]
    fn test_exact_record_is_valid() {
        let audit = Arc::new(MemoryAuditLog::new());
        let v = validator(
            vec![record("RU2023001", "John Doe", "Ranchi University", 2023)],
            audit.clone(),
        );
        let verdict = v.validate_text(SCENARIO_TEXT, 95.0, &RequestContext::default());

        assert_eq!(verdict.status, ValidationStatus::Valid);
        assert!(verdict.confidence_score >= 90.0);
        assert!(verdict.issues.is_empty());
        assert_eq!(verdict.audit_id, Some(1));
        assert_eq!(
            verdict.matched_details.unwrap().matched_certificate_number,
            "RU2023001"
        );
        assert_eq!(audit.entries()[0].status, ValidationStatus::Valid);
    }

    #[test]
    fn test_missing_identity_fields_are_invalid() {
        let audit = Arc::new(MemoryAuditLog::new());
        let v = validator(Vec::new(), audit.clone());
        let fields = ParsedFields {
            certificate_number: Some("RU2023001".to_string()),
            graduation_year: Some("2023".to_string()),
            ..Default::default()
        };
        let verdict = v.validate_fields(fields, 80.0, 6, &RequestContext::default());

        assert_eq!(verdict.status, ValidationStatus::Invalid);
        assert_eq!(verdict.confidence_score, 20.0);
        assert_eq!(verdict.methods_tried, 6);
        let entry = &audit.entries()[0];
        assert_eq!(entry.student_name, "Unknown");
        assert_eq!(entry.certificate_number, "RU2023001");
    }

    #[test]
    fn test_unregistered_name_is_not_found() {
        let v = validator(
            vec![record("RU2023001", "John Doe", "Ranchi University", 2023)],
            Arc::new(MemoryAuditLog::new()),
        );
        let verdict = v.validate_text(
            "Ranchi University\nName: Zephyr Quill Year: 2021",
            90.0,
            &RequestContext::default(),
        );
        assert_eq!(verdict.status, ValidationStatus::NotFound);
        assert_eq!(verdict.confidence_score, 25.0);
    }

    #[test]
    fn test_registry_failure_is_error_verdict() {
        let audit = Arc::new(MemoryAuditLog::new());
        let v = validator_with(
            Arc::new(ScriptedRecognizer::new(Vec::new())),
            Arc::new(DownRegistry),
            audit.clone(),
        );
        let verdict = v.validate_text(SCENARIO_TEXT, 95.0, &RequestContext::default());

        assert_eq!(verdict.status, ValidationStatus::Error);
        assert_eq!(verdict.confidence_score, 0.0);
        assert!(verdict.issues[0].starts_with("Validation error: "));
        assert_eq!(audit.entries().len(), 1);
    }

    #[test]
    fn test_audit_failure_leaves_id_empty() {
        let v = validator_with(
            Arc::new(ScriptedRecognizer::new(Vec::new())),
            Arc::new(InMemoryRegistry::new(vec![record(
                "RU2023001",
                "John Doe",
                "Ranchi University",
                2023,
            )])),
            Arc::new(BrokenAudit),
        );
        let verdict = v.validate_text(SCENARIO_TEXT, 95.0, &RequestContext::default());
        assert_eq!(verdict.status, ValidationStatus::Valid);
        assert_eq!(verdict.audit_id, None);
    }

    #[test]
    fn test_image_document_runs_recognition() {
        let script = (0..6).map(|_| output(SCENARIO_TEXT, &[88.0, 92.0])).collect();
        let audit = Arc::new(MemoryAuditLog::new());
        let v = validator_with(
            Arc::new(ScriptedRecognizer::new(script)),
            Arc::new(InMemoryRegistry::new(vec![record(
                "RU2023001",
                "John Doe",
                "Ranchi University",
                2023,
            )])),
            audit.clone(),
        );
        let png = ImageProcessor::encode_png(&GrayImage::from_pixel(24, 24, Luma([210u8]))).unwrap();
        let document = RawDocument::new(png, DocumentKind::Image(ImageKind::Png)).with_file_name("scan.png");
        let context = document.request_context("registrar");

        let verdict = v.validate_document(&document, &context);
        assert_eq!(verdict.status, ValidationStatus::Valid);
        assert_eq!(verdict.ocr_confidence, 90.0);
        assert_eq!(verdict.methods_tried, 6);
        assert_eq!(audit.entries()[0].file_hash, document.file_hash());
        assert_eq!(audit.entries()[0].uploaded_filename, "scan.png");
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let v = validator(Vec::new(), Arc::new(MemoryAuditLog::new()));
        assert!(matches!(
            v.validate_file(Path::new("transcript.docx"), "registrar"),
            Err(CertificateError::UnsupportedFormat(_))
        ));
    }
}
