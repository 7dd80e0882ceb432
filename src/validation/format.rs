use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::models::{is_filled, ParsedFields, MIN_GRADUATION_YEAR};

lazy_static! {
    static ref NAME_FORMAT: Regex = Regex::new(r"^[A-Za-z\s.]+$").expect("valid regex");
    static ref CERTIFICATE_FORMAT: Regex = Regex::new(r"^[A-Za-z0-9\-/]+$").expect("valid regex");
}

/// Gate run before the registry is consulted. An empty issue list means the
/// fields are fit for matching.
pub struct FormatValidator;

impl FormatValidator {
    pub fn validate(fields: &ParsedFields, current_year: i32) -> Vec<String> {
        let mut issues = Vec::new();

        // Check that required fields are present
        if !is_filled(&fields.student_name) {
            issues.push("Missing required field: student_name".to_string());
        }
        if !is_filled(&fields.institution_name) {
            issues.push("Missing required field: institution_name".to_string());
        }

        if let Some(year) = fields.graduation_year.as_deref().filter(|y| !y.trim().is_empty()) {
            match year.trim().parse::<i32>() {
                Ok(year) if year < MIN_GRADUATION_YEAR || year > current_year + 1 => {
                    issues.push(format!("Invalid graduation year: {}", year));
                }
                Ok(_) => {}
                Err(_) => issues.push("Invalid graduation year format".to_string()),
            }
        }

        if let Some(name) = fields.student_name.as_deref().filter(|n| !n.trim().is_empty()) {
            if name.chars().count() < 2 || !NAME_FORMAT.is_match(name) {
                issues.push("Invalid student name format".to_string());
            }
        }

        if let Some(number) = fields
            .certificate_number
            .as_deref()
            .filter(|n| !n.trim().is_empty())
        {
            if number.chars().count() < 3 || !CERTIFICATE_FORMAT.is_match(number) {
                issues.push("Invalid certificate number format".to_string());
            }
        }

        if !issues.is_empty() {
            debug!("Format check found {} issue(s)", issues.len());
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(name: Option<&str>, institution: Option<&str>) -> ParsedFields {
        ParsedFields {
            student_name: name.map(String::from),
            institution_name: institution.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_fields_pass() {
        let mut f = fields(Some("John A. Doe"), Some("Ranchi University"));
        f.certificate_number = Some("RU/2023-001".to_string());
        f.graduation_year = Some("2023".to_string());
        assert!(FormatValidator::validate(&f, 2024).is_empty());
    }

    #[test]
    fn test_missing_required_fields_are_itemized() {
        let issues = FormatValidator::validate(&fields(None, Some("  ")), 2024);
        assert_eq!(
            issues,
            vec![
                "Missing required field: student_name".to_string(),
                "Missing required field: institution_name".to_string(),
            ]
        );
    }

    #[test]
    fn test_graduation_year_window() {
        let mut f = fields(Some("John Doe"), Some("Ranchi University"));
        f.graduation_year = Some("2025".to_string());
        assert!(FormatValidator::validate(&f, 2024).is_empty());

        f.graduation_year = Some("2026".to_string());
        assert_eq!(
            FormatValidator::validate(&f, 2024),
            vec!["Invalid graduation year: 2026".to_string()]
        );

        f.graduation_year = Some("1949".to_string());
        assert_eq!(FormatValidator::validate(&f, 2024).len(), 1);

        f.graduation_year = Some("20x3".to_string());
        assert_eq!(
            FormatValidator::validate(&f, 2024),
            vec!["Invalid graduation year format".to_string()]
        );
    }

    #[test]
    fn test_name_and_number_formats() {
        let mut f = fields(Some("J0hn Doe"), Some("Ranchi University"));
        f.certificate_number = Some("RU#2023".to_string());
        assert_eq!(
            FormatValidator::validate(&f, 2024),
            vec![
                "Invalid student name format".to_string(),
                "Invalid certificate number format".to_string(),
            ]
        );

        f.student_name = Some("J".to_string());
        f.certificate_number = Some("R1".to_string());
        assert_eq!(FormatValidator::validate(&f, 2024).len(), 2);
    }
}
