use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Image processing error: {0}")]
    ImageProcessing(String),
    #[error("Recognition error: {0}")]
    Recognition(String),
    #[error("Recognition timed out after {0} ms")]
    RecognitionTimeout(u64),
    #[error("PDF extraction error: {0}")]
    PdfExtraction(String),
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),
    #[error("Audit log error: {0}")]
    Audit(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CertificateError>;
