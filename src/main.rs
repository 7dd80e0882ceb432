// Academic certificate validation from the command line

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use certcheck::{
    models::{ValidationVerdict, ValidatorConfig},
    utils::{CertificateError, Result},
    validation::{AuditLog, InMemoryRegistry, JsonLinesAuditLog, MemoryAuditLog},
    CertificateValidator,
};
use clap::Parser;
use log::{error, info};

/// Uploads above this size are refused before any processing.
const MAX_INPUT_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "certcheck")]
#[command(version, about = "Extract fields from an academic certificate and check them against a registry", long_about = None)]
struct Cli {
    /// Certificate scan or PDF (png, jpg, jpeg, tiff, bmp, pdf)
    file: PathBuf,

    /// JSON array of registry records
    #[arg(short, long)]
    registry: PathBuf,

    /// Append a JSON line per verification to this file
    #[arg(short, long)]
    audit_log: Option<PathBuf>,

    /// Validator configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recorded in the audit trail as the requester
    #[arg(long, default_value = "cli")]
    verified_by: String,

    /// Print the verdict as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn print_report(verdict: &ValidationVerdict) {
    println!("\n===============================================");
    println!("      CERTIFICATE VALIDATION REPORT");
    println!("===============================================\n");

    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let fields = &verdict.extracted_fields;
    println!("EXTRACTED FIELDS:");
    println!("  Student Name: {}", show(&fields.student_name));
    println!("  Certificate Number: {}", show(&fields.certificate_number));
    println!("  Roll Number: {}", show(&fields.roll_number));
    println!("  Institution: {}", show(&fields.institution_name));
    println!("  Course: {}", show(&fields.course_name));
    println!("  Degree Type: {}", show(&fields.degree_type));
    println!("  Graduation Year: {}", show(&fields.graduation_year));
    println!("  Grade: {}", show(&fields.grade));
    println!("  Issue Date: {}", show(&fields.issue_date));

    println!("\nEXTRACTION:");
    println!("  Recognition Confidence: {:.1}%", verdict.ocr_confidence);
    println!("  Extraction Confidence: {:.2}%", verdict.extraction_confidence);
    println!("  Methods Tried: {}", verdict.methods_tried);

    if let Some(details) = &verdict.matched_details {
        println!("\nREGISTRY MATCH:");
        println!("  Certificate Number: {}", details.matched_certificate_number);
        println!("  Student Name: {}", details.matched_student_name);
        println!("  Institution: {}", details.matched_institution_name);
        println!("  Year: {}", details.matched_year);
        println!("  Similarity: {:.4}", details.similarity_score);
    }

    if !verdict.issues.is_empty() {
        println!("\nISSUES FOUND:");
        for issue in &verdict.issues {
            println!("  - {}", issue);
        }
    }

    if let Some(id) = verdict.audit_id {
        println!("\nAudit entry: {}", id);
    }
    println!(
        "Certificate validation result: {} ({:.2}%)",
        verdict.status.as_str().to_uppercase(),
        verdict.confidence_score
    );
}

fn run(cli: &Cli) -> Result<ValidationVerdict> {
    let size = std::fs::metadata(&cli.file)?.len();
    if size > MAX_INPUT_BYTES {
        return Err(CertificateError::UnsupportedFormat(format!(
            "{} is {} bytes, limit is {} bytes",
            cli.file.display(),
            size,
            MAX_INPUT_BYTES
        )));
    }

    let config = match &cli.config {
        Some(path) => ValidatorConfig::from_file(path)?,
        None => ValidatorConfig::default(),
    };
    let registry = Arc::new(InMemoryRegistry::from_file(&cli.registry)?);
    let audit_log: Arc<dyn AuditLog> = match &cli.audit_log {
        Some(path) => {
            let log = JsonLinesAuditLog::open(path)?;
            info!("Recording verifications in {}", log.path().display());
            Arc::new(log)
        }
        None => Arc::new(MemoryAuditLog::new()),
    };

    let validator = CertificateValidator::new(&config, registry, audit_log)?;
    validator.validate_file(&cli.file, &cli.verified_by)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match run(&cli) {
        Ok(verdict) => {
            if cli.json {
                match serde_json::to_string_pretty(&verdict) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        error!("Failed to serialize verdict: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                print_report(&verdict);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error validating certificate: {}", e);
            ExitCode::FAILURE
        }
    }
}
