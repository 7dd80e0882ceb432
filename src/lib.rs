pub mod models;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod certificate_validator;

pub use certificate_validator::CertificateValidator;
