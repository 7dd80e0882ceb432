use std::path::Path;

use log::info;

use crate::models::RegistryRecord;
use crate::utils::{CertificateError, Result};

/// Read access to the trusted certificate registry. Revoked records
/// (`is_valid == false`) are never returned.
pub trait Registry: Send + Sync {
    fn find_by_certificate_number(&self, certificate_number: &str) -> Result<Option<RegistryRecord>>;

    /// Case-insensitive substring match on the student name.
    fn find_by_name_like(&self, student_name: &str) -> Result<Vec<RegistryRecord>>;
}

/// Registry held in memory, usually loaded from a JSON array of records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    records: Vec<RegistryRecord>,
}

impl InMemoryRegistry {
    pub fn new(records: Vec<RegistryRecord>) -> Self {
        InMemoryRegistry { records }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CertificateError::RegistryUnavailable(format!("failed to read {}: {}", path.display(), e))
        })?;
        let records: Vec<RegistryRecord> = serde_json::from_str(&raw)?;
        info!("Loaded {} registry records from {}", records.len(), path.display());
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Registry for InMemoryRegistry {
    fn find_by_certificate_number(&self, certificate_number: &str) -> Result<Option<RegistryRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.is_valid && r.certificate_number == certificate_number)
            .cloned())
    }

    fn find_by_name_like(&self, student_name: &str) -> Result<Vec<RegistryRecord>> {
        let needle = student_name.to_lowercase();
        Ok(self
            .records
            .iter()
            .filter(|r| r.is_valid && r.student_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub fn record(number: &str, name: &str, institution: &str, year: i32) -> RegistryRecord {
        RegistryRecord {
            certificate_number: number.to_string(),
            student_name: name.to_string(),
            institution_name: institution.to_string(),
            graduation_year: year,
            course_name: None,
            grade: None,
            roll_number: None,
            degree_type: None,
            issue_date: None,
            is_valid: true,
        }
    }

    #[test]
    fn test_exact_lookup_skips_revoked() {
        let mut revoked = record("RU2020001", "Jane Roe", "Ranchi University", 2020);
        revoked.is_valid = false;
        let registry = InMemoryRegistry::new(vec![
            revoked,
            record("RU2023001", "John Doe", "Ranchi University", 2023),
        ]);

        assert!(registry.find_by_certificate_number("RU2020001").unwrap().is_none());
        let hit = registry.find_by_certificate_number("RU2023001").unwrap().unwrap();
        assert_eq!(hit.student_name, "John Doe");
        assert!(registry.find_by_certificate_number("ru2023001").unwrap().is_none());
    }

    #[test]
    fn test_name_search_is_case_insensitive_substring() {
        let registry = InMemoryRegistry::new(vec![
            record("A1", "John Doe", "X University", 2021),
            record("A2", "Johnny Doerr", "Y College", 2019),
            record("A3", "Mary Major", "X University", 2021),
        ]);
        let hits = registry.find_by_name_like("JOHN").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(registry.find_by_name_like("Zephyr Quill").unwrap().is_empty());
    }

    #[test]
    fn test_from_file_defaults_optional_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"certificate_number": "RU2023001", "student_name": "John Doe",
                 "institution_name": "Ranchi University", "graduation_year": 2023,
                 "grade": "8.5 CGPA"}}]"#
        )
        .unwrap();

        let registry = InMemoryRegistry::from_file(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
        let hit = registry.find_by_certificate_number("RU2023001").unwrap().unwrap();
        assert!(hit.is_valid);
        assert_eq!(hit.course_name, None);
    }

    #[test]
    fn test_from_missing_file_is_unavailable() {
        assert!(matches!(
            InMemoryRegistry::from_file("/nonexistent/registry.json"),
            Err(CertificateError::RegistryUnavailable(_))
        ));
    }
}
