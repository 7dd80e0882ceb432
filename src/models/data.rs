use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{sha256_hex, CertificateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Png,
    Jpeg,
    Tiff,
    Bmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Image(ImageKind),
    Paged,
}

impl DocumentKind {
    /// Resolve the declared kind from a file extension (case-insensitive, no dot).
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Ok(DocumentKind::Image(ImageKind::Png)),
            "jpg" | "jpeg" => Ok(DocumentKind::Image(ImageKind::Jpeg)),
            "tif" | "tiff" => Ok(DocumentKind::Image(ImageKind::Tiff)),
            "bmp" => Ok(DocumentKind::Image(ImageKind::Bmp)),
            "pdf" => Ok(DocumentKind::Paged),
            other => Err(CertificateError::UnsupportedFormat(format!(
                "'{}' (supported: png, jpg, jpeg, tiff, bmp, pdf)",
                other
            ))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                CertificateError::UnsupportedFormat(format!("no file extension on {:?}", path))
            })?;
        Self::from_extension(extension)
    }
}

/// Document bytes as handed over by the caller for one request.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub content: Vec<u8>,
    pub kind: DocumentKind,
    pub file_name: Option<String>,
}

impl RawDocument {
    pub fn new(content: Vec<u8>, kind: DocumentKind) -> Self {
        RawDocument {
            content,
            kind,
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn file_hash(&self) -> String {
        sha256_hex(&self.content)
    }

    /// Audit context for validating this document on behalf of `verified_by`.
    pub fn request_context(&self, verified_by: &str) -> RequestContext {
        RequestContext {
            verified_by: verified_by.to_string(),
            uploaded_filename: self.file_name.clone().unwrap_or_default(),
            file_hash: self.file_hash(),
        }
    }
}

/// Preprocessing variants, in the fixed order used for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessMethod {
    Original,
    GaussianThreshold,
    AdaptiveThreshold,
    Morphological,
    EnhancedContrast,
    BilateralFilter,
    /// Unfiltered whole-image pass used when no variant produced usable text.
    Fallback,
}

impl PreprocessMethod {
    pub const ORDERED: [PreprocessMethod; 6] = [
        PreprocessMethod::Original,
        PreprocessMethod::GaussianThreshold,
        PreprocessMethod::AdaptiveThreshold,
        PreprocessMethod::Morphological,
        PreprocessMethod::EnhancedContrast,
        PreprocessMethod::BilateralFilter,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PreprocessMethod::Original => "original",
            PreprocessMethod::GaussianThreshold => "gaussian_thresh",
            PreprocessMethod::AdaptiveThreshold => "adaptive_thresh",
            PreprocessMethod::Morphological => "morphological",
            PreprocessMethod::EnhancedContrast => "enhanced_contrast",
            PreprocessMethod::BilateralFilter => "bilateral_filter",
            PreprocessMethod::Fallback => "fallback",
        }
    }
}

impl fmt::Display for PreprocessMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    pub confidence: f64,
    pub method: PreprocessMethod,
    pub word_count: usize,
}

impl RecognitionResult {
    pub fn new(text: String, confidence: f64, method: PreprocessMethod) -> Self {
        let text = text.trim().to_string();
        let word_count = text.split_whitespace().count();
        RecognitionResult {
            text,
            confidence,
            method,
            word_count,
        }
    }

    /// Zero-confidence placeholder recorded for a failed method.
    pub fn failed(method: PreprocessMethod) -> Self {
        RecognitionResult {
            text: String::new(),
            confidence: 0.0,
            method,
            word_count: 0,
        }
    }
}

/// Text and confidence chosen for one image, plus every per-method result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionOutcome {
    pub text: String,
    pub confidence: f64,
    pub methods_tried: usize,
    pub results: Vec<RecognitionResult>,
}

impl FusionOutcome {
    pub fn empty() -> Self {
        FusionOutcome {
            text: String::new(),
            confidence: 0.0,
            methods_tried: 0,
            results: Vec::new(),
        }
    }
}

/// Output of the document resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub confidence: f64,
    pub methods_tried: usize,
}

impl ExtractedText {
    pub fn empty() -> Self {
        ExtractedText {
            text: String::new(),
            confidence: 0.0,
            methods_tried: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub student_name: Option<String>,
    pub certificate_number: Option<String>,
    pub roll_number: Option<String>,
    pub course_name: Option<String>,
    pub degree_type: Option<String>,
    pub institution_name: Option<String>,
    pub graduation_year: Option<String>,
    pub grade: Option<String>,
    pub issue_date: Option<String>,
}

impl ParsedFields {
    pub const FIELD_COUNT: usize = 9;
    pub const CRITICAL_COUNT: usize = 3;

    fn all(&self) -> [&Option<String>; Self::FIELD_COUNT] {
        [
            &self.student_name,
            &self.certificate_number,
            &self.roll_number,
            &self.course_name,
            &self.degree_type,
            &self.institution_name,
            &self.graduation_year,
            &self.grade,
            &self.issue_date,
        ]
    }

    pub fn filled_count(&self) -> usize {
        self.all().iter().filter(|f| is_filled(f)).count()
    }

    /// Filled identity-bearing fields: student name, certificate number, institution.
    pub fn critical_filled_count(&self) -> usize {
        [
            &self.student_name,
            &self.certificate_number,
            &self.institution_name,
        ]
        .iter()
        .filter(|f| is_filled(f))
        .count()
    }

    pub fn graduation_year_value(&self) -> Option<i32> {
        self.graduation_year
            .as_deref()
            .and_then(|y| y.trim().parse::<i32>().ok())
    }
}

/// A field counts as present only if it holds non-whitespace text.
pub fn is_filled(field: &Option<String>) -> bool {
    field.as_deref().map_or(false, |v| !v.trim().is_empty())
}

fn default_true() -> bool {
    true
}

/// Ground-truth certificate as stored by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub certificate_number: String,
    pub student_name: String,
    pub institution_name: String,
    pub graduation_year: i32,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub degree_type: Option<String>,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default = "default_true")]
    pub is_valid: bool,
}

impl RegistryRecord {
    /// SHA-256 over the identity fields of the record.
    pub fn fingerprint(&self) -> String {
        let data = format!(
            "{}_{}_{}_{}_{}",
            self.certificate_number,
            self.student_name,
            self.roll_number.as_deref().unwrap_or(""),
            self.course_name.as_deref().unwrap_or(""),
            self.graduation_year
        );
        sha256_hex(data.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub record: RegistryRecord,
    pub similarity: f64,
    pub discrepancies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedDetails {
    pub matched_certificate_number: String,
    pub matched_student_name: String,
    pub matched_institution_name: String,
    pub matched_year: i32,
    pub similarity_score: f64,
}

impl From<&MatchCandidate> for MatchedDetails {
    fn from(candidate: &MatchCandidate) -> Self {
        MatchedDetails {
            matched_certificate_number: candidate.record.certificate_number.clone(),
            matched_student_name: candidate.record.student_name.clone(),
            matched_institution_name: candidate.record.institution_name.clone(),
            matched_year: candidate.record.graduation_year,
            similarity_score: candidate.similarity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[serde(rename = "Valid")]
    Valid,
    #[serde(rename = "Likely Valid")]
    LikelyValid,
    #[serde(rename = "Suspicious")]
    Suspicious,
    #[serde(rename = "Invalid")]
    Invalid,
    #[serde(rename = "Not Found")]
    NotFound,
    #[serde(rename = "Error")]
    Error,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "Valid",
            ValidationStatus::LikelyValid => "Likely Valid",
            ValidationStatus::Suspicious => "Suspicious",
            ValidationStatus::Invalid => "Invalid",
            ValidationStatus::NotFound => "Not Found",
            ValidationStatus::Error => "Error",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of matching parsed fields against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub status: ValidationStatus,
    pub confidence_score: f64,
    pub matched_details: Option<MatchedDetails>,
    pub issues: Vec<String>,
}

impl MatchOutcome {
    pub fn terminal(status: ValidationStatus, confidence_score: f64, issues: Vec<String>) -> Self {
        MatchOutcome {
            status,
            confidence_score,
            matched_details: None,
            issues,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub status: ValidationStatus,
    pub confidence_score: f64,
    pub matched_details: Option<MatchedDetails>,
    pub issues: Vec<String>,
    pub extracted_fields: ParsedFields,
    pub ocr_confidence: f64,
    pub extraction_confidence: f64,
    pub methods_tried: usize,
    pub audit_id: Option<u64>,
}

/// Request metadata carried into the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub verified_by: String,
    pub uploaded_filename: String,
    pub file_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub certificate_number: String,
    pub student_name: String,
    pub institution_name: String,
    pub status: ValidationStatus,
    pub confidence_score: f64,
    pub extracted_fields: ParsedFields,
    pub verified_by: String,
    pub uploaded_filename: String,
    pub file_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(fields: &ParsedFields, outcome: &MatchOutcome, context: &RequestContext) -> Self {
        let or_unknown = |field: &Option<String>| {
            field
                .clone()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string())
        };
        AuditEntry {
            certificate_number: or_unknown(&fields.certificate_number),
            student_name: or_unknown(&fields.student_name),
            institution_name: or_unknown(&fields.institution_name),
            status: outcome.status,
            confidence_score: outcome.confidence_score,
            extracted_fields: fields.clone(),
            verified_by: context.verified_by.clone(),
            uploaded_filename: context.uploaded_filename.clone(),
            file_hash: context.file_hash.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_carries_file_name_and_hash() {
        let document = RawDocument::new(b"certificate".to_vec(), DocumentKind::Paged)
            .with_file_name("degree.pdf");
        let context = document.request_context("registrar-2");
        assert_eq!(context.verified_by, "registrar-2");
        assert_eq!(context.uploaded_filename, "degree.pdf");
        assert_eq!(context.file_hash, sha256_hex(b"certificate"));

        let anonymous = RawDocument::new(Vec::new(), DocumentKind::Paged).request_context("cli");
        assert_eq!(anonymous.uploaded_filename, "");
    }

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(
            DocumentKind::from_extension("JPG").unwrap(),
            DocumentKind::Image(ImageKind::Jpeg)
        );
        assert_eq!(DocumentKind::from_extension("pdf").unwrap(), DocumentKind::Paged);
        assert!(matches!(
            DocumentKind::from_extension("docx"),
            Err(CertificateError::UnsupportedFormat(_))
        ));
        assert!(DocumentKind::from_path(Path::new("scan")).is_err());
    }

    #[test]
    fn test_field_counts_ignore_blank_values() {
        let fields = ParsedFields {
            student_name: Some("John Doe".to_string()),
            institution_name: Some("   ".to_string()),
            grade: Some("A+".to_string()),
            ..Default::default()
        };
        assert_eq!(fields.filled_count(), 2);
        assert_eq!(fields.critical_filled_count(), 1);
    }

    #[test]
    fn test_status_serializes_with_display_names() {
        let json = serde_json::to_string(&ValidationStatus::LikelyValid).unwrap();
        assert_eq!(json, "\"Likely Valid\"");
        assert_eq!(ValidationStatus::NotFound.to_string(), "Not Found");
    }

    #[test]
    fn test_audit_entry_substitutes_unknown() {
        let outcome = MatchOutcome::terminal(ValidationStatus::Invalid, 20.0, vec![]);
        let entry = AuditEntry::new(&ParsedFields::default(), &outcome, &RequestContext::default());
        assert_eq!(entry.student_name, "Unknown");
        assert_eq!(entry.certificate_number, "Unknown");
        assert_eq!(entry.status, ValidationStatus::Invalid);
    }

    #[test]
    fn test_registry_record_defaults() {
        let record: RegistryRecord = serde_json::from_str(
            r#"{"certificate_number":"RU2023001","student_name":"John Doe",
                "institution_name":"Ranchi University","graduation_year":2023}"#,
        )
        .unwrap();
        assert!(record.is_valid);
        assert!(record.course_name.is_none());
        assert_eq!(record.fingerprint().len(), 64);
    }
}
