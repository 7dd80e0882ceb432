use std::collections::HashSet;

use log::{debug, info};

use crate::models::{
    is_filled, MatchCandidate, MatchOutcome, MatchedDetails, MatchingConfig, ParsedFields,
    RegistryRecord, ValidationStatus,
};
use crate::utils::Result;
use crate::validation::{FormatValidator, Registry};

/// |A ∩ B| / |A ∪ B| over lowercase whitespace-split token sets; 0 when both are empty.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let left: HashSet<&str> = a_lower.split_whitespace().collect();
    let right: HashSet<&str> = b_lower.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Scores registry candidates against parsed fields and classifies the best one.
pub struct CandidateMatcher {
    config: MatchingConfig,
}

impl CandidateMatcher {
    pub fn new(config: MatchingConfig) -> Self {
        CandidateMatcher { config }
    }

    /// Run the format gate, retrieve candidates and classify the best match.
    /// Registry failures are returned as errors, never as "not found".
    pub fn match_fields(
        &self,
        fields: &ParsedFields,
        registry: &dyn Registry,
        current_year: i32,
    ) -> Result<MatchOutcome> {
        let issues = FormatValidator::validate(fields, current_year);
        if !issues.is_empty() {
            return Ok(MatchOutcome::terminal(
                ValidationStatus::Invalid,
                self.config.invalid_fields_confidence,
                issues,
            ));
        }

        let candidates = self.find_candidates(fields, registry)?;
        if candidates.is_empty() {
            return Ok(MatchOutcome::terminal(
                ValidationStatus::NotFound,
                self.config.not_found_confidence,
                vec!["Certificate not found in registry".to_string()],
            ));
        }

        match self.best_match(&candidates) {
            Some(best) => {
                let status = self.classify(best.similarity);
                info!(
                    "Matched {} with similarity {:.4} ({})",
                    best.record.certificate_number, best.similarity, status
                );
                Ok(MatchOutcome {
                    status,
                    confidence_score: round_to(best.similarity * 100.0, 2),
                    matched_details: Some(MatchedDetails::from(best)),
                    issues: best.discrepancies.clone(),
                })
            }
            None => Ok(MatchOutcome::terminal(
                ValidationStatus::Suspicious,
                self.config.no_strong_match_confidence,
                vec!["No strong matches found".to_string()],
            )),
        }
    }

    /// Exact certificate number lookup first; the name search only runs when
    /// that yields nothing, and keeps hits above the name-search floor.
    pub fn find_candidates(
        &self,
        fields: &ParsedFields,
        registry: &dyn Registry,
    ) -> Result<Vec<MatchCandidate>> {
        if let Some(number) = fields.certificate_number.as_deref().filter(|n| !n.trim().is_empty()) {
            if let Some(record) = registry.find_by_certificate_number(number)? {
                debug!("Exact registry hit for {} ({})", number, record.fingerprint());
                return Ok(vec![self.candidate(fields, record)]);
            }
        }

        let name = match fields.student_name.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(name) => name,
            None => return Ok(Vec::new()),
        };
        let hits = registry.find_by_name_like(name)?;
        let total = hits.len();
        let candidates: Vec<MatchCandidate> = hits
            .into_iter()
            .map(|record| self.candidate(fields, record))
            .filter(|c| c.similarity > self.config.name_search_min_score)
            .collect();
        debug!(
            "Name search for '{}': {} hit(s), {} above {}",
            name,
            total,
            candidates.len(),
            self.config.name_search_min_score
        );
        Ok(candidates)
    }

    fn candidate(&self, fields: &ParsedFields, record: RegistryRecord) -> MatchCandidate {
        let similarity = self.similarity(fields, &record);
        let discrepancies = self.discrepancies(fields, &record);
        MatchCandidate {
            record,
            similarity,
            discrepancies,
        }
    }

    /// Weighted sum when all four components are comparable; otherwise the
    /// plain mean of the comparable component scores. Rounded to 4 decimals.
    pub fn similarity(&self, fields: &ParsedFields, record: &RegistryRecord) -> f64 {
        let c = &self.config;
        let mut components: Vec<(f64, f64)> = Vec::with_capacity(4);

        if let Some(name) = fields.student_name.as_deref().filter(|_| is_filled(&fields.student_name)) {
            if !record.student_name.trim().is_empty() {
                components.push((token_set_similarity(name, &record.student_name), c.name_weight));
            }
        }
        if let Some(institution) = fields
            .institution_name
            .as_deref()
            .filter(|_| is_filled(&fields.institution_name))
        {
            if !record.institution_name.trim().is_empty() {
                components.push((
                    token_set_similarity(institution, &record.institution_name),
                    c.institution_weight,
                ));
            }
        }
        if let Some(year) = fields.graduation_year_value() {
            let diff = (year - record.graduation_year).abs() as f64;
            components.push(((1.0 - diff / c.year_tolerance).max(0.0), c.year_weight));
        }
        if let (Some(course), Some(registered)) = (
            fields.course_name.as_deref().filter(|_| is_filled(&fields.course_name)),
            record.course_name.as_deref().filter(|v| !v.trim().is_empty()),
        ) {
            components.push((token_set_similarity(course, registered), c.course_weight));
        }

        let similarity = match components.len() {
            0 => 0.0,
            4 => components.iter().map(|(score, weight)| score * weight).sum(),
            n => components.iter().map(|(score, _)| score).sum::<f64>() / n as f64,
        };
        round_to(similarity, 4)
    }

    /// Informational differences between extracted and registered values.
    pub fn discrepancies(&self, fields: &ParsedFields, record: &RegistryRecord) -> Vec<String> {
        let mut issues = Vec::new();

        if let Some(name) = fields.student_name.as_deref().filter(|_| is_filled(&fields.student_name)) {
            if name.to_lowercase() != record.student_name.to_lowercase() {
                issues.push(format!(
                    "Name mismatch: extracted \"{}\" vs registry \"{}\"",
                    name, record.student_name
                ));
            }
        }

        if let Some(year) = fields.graduation_year_value() {
            if (year - record.graduation_year).abs() > self.config.discrepancy_year_tolerance {
                issues.push(format!(
                    "Year mismatch: extracted \"{}\" vs registry \"{}\"",
                    year, record.graduation_year
                ));
            }
        }

        if let (Some(grade), Some(registered)) = (
            fields.grade.as_deref().filter(|_| is_filled(&fields.grade)),
            record.grade.as_deref().filter(|v| !v.trim().is_empty()),
        ) {
            if grade != registered {
                issues.push(format!(
                    "Grade mismatch: extracted \"{}\" vs registry \"{}\"",
                    grade, registered
                ));
            }
        }

        issues
    }

    /// Strictly highest similarity wins, first on ties; only accepted above
    /// the acceptance threshold.
    pub fn best_match<'a>(&self, candidates: &'a [MatchCandidate]) -> Option<&'a MatchCandidate> {
        let mut best: Option<&MatchCandidate> = None;
        for candidate in candidates {
            if best.map_or(true, |b| candidate.similarity > b.similarity) {
                best = Some(candidate);
            }
        }
        best.filter(|b| b.similarity > self.config.acceptance_threshold)
    }

    pub fn classify(&self, similarity: f64) -> ValidationStatus {
        let c = &self.config;
        if similarity >= c.valid_threshold {
            ValidationStatus::Valid
        } else if similarity >= c.likely_valid_threshold {
            ValidationStatus::LikelyValid
        } else if similarity >= c.suspicious_threshold {
            ValidationStatus::Suspicious
        } else {
            ValidationStatus::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CertificateError;
    use crate::validation::database::tests::record;
    use crate::validation::InMemoryRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn matcher() -> CandidateMatcher {
        CandidateMatcher::new(MatchingConfig::default())
    }

    fn fields(name: &str, institution: &str, year: &str) -> ParsedFields {
        ParsedFields {
            student_name: Some(name.to_string()),
            institution_name: Some(institution.to_string()),
            graduation_year: Some(year.to_string()),
            ..Default::default()
        }
    }

    struct CountingRegistry {
        calls: AtomicUsize,
    }

    impl Registry for CountingRegistry {
        fn find_by_certificate_number(&self, _n: &str) -> Result<Option<RegistryRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        fn find_by_name_like(&self, _n: &str) -> Result<Vec<RegistryRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct DownRegistry;

    impl Registry for DownRegistry {
        fn find_by_certificate_number(&self, _n: &str) -> Result<Option<RegistryRecord>> {
            Err(CertificateError::RegistryUnavailable("connection refused".to_string()))
        }

        fn find_by_name_like(&self, _n: &str) -> Result<Vec<RegistryRecord>> {
            Err(CertificateError::RegistryUnavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_token_set_similarity() {
        assert_eq!(token_set_similarity("John Doe", "john DOE"), 1.0);
        assert_eq!(token_set_similarity("John Doe", "John Smith"), 1.0 / 3.0);
        assert_eq!(token_set_similarity("", "  "), 0.0);
    }

    #[test]
    fn test_similarity_renormalizes_missing_components() {
        let f = fields("John Doe", "Ranchi University", "2023");
        let r = record("RU2023001", "John Doe", "Ranchi University", 2023);
        // Three comparable components, each a perfect match.
        assert_eq!(matcher().similarity(&f, &r), 1.0);

        let r = record("RU2023001", "John Doe", "Delhi College", 2023);
        assert_eq!(matcher().similarity(&f, &r), 0.6667);
    }

    #[test]
    fn test_similarity_weighted_when_all_components_present() {
        let mut f = fields("John Doe", "Ranchi University", "2023");
        f.course_name = Some("Bachelor of Science".to_string());
        let mut r = record("RU2023001", "John Doe", "Ranchi University", 2020);
        r.course_name = Some("Bachelor of Science".to_string());
        // 0.4 + 0.3 + 0.2 * (1 - 3/5) + 0.1
        assert_eq!(matcher().similarity(&f, &r), 0.88);
    }

    #[test]
    fn test_year_component_floors_at_zero() {
        let f = ParsedFields {
            graduation_year: Some("2023".to_string()),
            ..Default::default()
        };
        let r = record("X1", "", "", 2010);
        assert_eq!(matcher().similarity(&f, &r), 0.0);
    }

    #[test]
    fn test_classification_bands() {
        let m = matcher();
        assert_eq!(m.classify(0.9), ValidationStatus::Valid);
        assert_eq!(m.classify(0.8999), ValidationStatus::LikelyValid);
        assert_eq!(m.classify(0.7), ValidationStatus::LikelyValid);
        assert_eq!(m.classify(0.5), ValidationStatus::Suspicious);
        assert_eq!(m.classify(0.4999), ValidationStatus::Invalid);
    }

    #[test]
    fn test_best_match_first_wins_ties() {
        let candidate = |number: &str, similarity: f64| MatchCandidate {
            record: record(number, "John Doe", "X", 2020),
            similarity,
            discrepancies: Vec::new(),
        };
        let candidates = vec![candidate("A", 0.8), candidate("B", 0.8), candidate("C", 0.7)];
        let best = matcher().best_match(&candidates).unwrap();
        assert_eq!(best.record.certificate_number, "A");

        assert!(matcher().best_match(&[candidate("D", 0.6)]).is_none());
    }

    #[test]
    fn test_invalid_fields_never_query_registry() {
        let registry = CountingRegistry {
            calls: AtomicUsize::new(0),
        };
        let f = ParsedFields {
            certificate_number: Some("RU2023001".to_string()),
            ..Default::default()
        };
        let outcome = matcher().match_fields(&f, &registry, 2024).unwrap();
        assert_eq!(outcome.status, ValidationStatus::Invalid);
        assert_eq!(outcome.confidence_score, 20.0);
        assert_eq!(outcome.issues.len(), 2);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let registry = InMemoryRegistry::new(vec![record("RU1", "John Doe", "Ranchi University", 2023)]);
        let f = fields("Zephyr Quill", "Ranchi University", "2023");
        let outcome = matcher().match_fields(&f, &registry, 2024).unwrap();
        assert_eq!(outcome.status, ValidationStatus::NotFound);
        assert_eq!(outcome.confidence_score, 25.0);
        assert_eq!(outcome.issues, vec!["Certificate not found in registry".to_string()]);
    }

    #[test]
    fn test_weak_name_hits_are_dropped() {
        let registry = InMemoryRegistry::new(vec![record("X1", "John Doe", "Delhi College", 2000)]);
        let f = fields("John", "Ranchi University", "2023");
        let outcome = matcher().match_fields(&f, &registry, 2024).unwrap();
        assert_eq!(outcome.status, ValidationStatus::NotFound);
    }

    #[test]
    fn test_similarity_of_exactly_threshold_is_rejected() {
        let mut f = fields("John Doe", "Ranchi University", "2023");
        f.certificate_number = Some("RU2023001".to_string());
        f.course_name = Some("Bachelor Arts".to_string());
        let mut r = record("RU2023001", "John Doe", "Delhi College", 2023);
        r.course_name = Some("Master Science".to_string());
        let registry = InMemoryRegistry::new(vec![r]);

        let outcome = matcher().match_fields(&f, &registry, 2024).unwrap();
        assert_eq!(outcome.status, ValidationStatus::Suspicious);
        assert_eq!(outcome.confidence_score, 40.0);
        assert_eq!(outcome.issues, vec!["No strong matches found".to_string()]);
        assert!(outcome.matched_details.is_none());
    }

    #[test]
    fn test_year_mismatch_is_reported_on_accepted_match() {
        let mut f = fields("John Doe", "Ranchi University", "2023");
        f.certificate_number = Some("RU2023001".to_string());
        f.course_name = Some("Bachelor of Science".to_string());
        let mut r = record("RU2023001", "John Doe", "Ranchi University", 2020);
        r.course_name = Some("Bachelor of Science".to_string());
        let registry = InMemoryRegistry::new(vec![r]);

        let outcome = matcher().match_fields(&f, &registry, 2024).unwrap();
        assert_eq!(outcome.status, ValidationStatus::LikelyValid);
        assert_eq!(outcome.confidence_score, 88.0);
        assert_eq!(
            outcome.issues,
            vec!["Year mismatch: extracted \"2023\" vs registry \"2020\"".to_string()]
        );
        let details = outcome.matched_details.unwrap();
        assert_eq!(details.matched_certificate_number, "RU2023001");
        assert_eq!(details.similarity_score, 0.88);
    }

    #[test]
    fn test_name_and_grade_discrepancies() {
        let mut f = fields("Jon Doe", "Ranchi University", "2023");
        f.grade = Some("8.5 CGPA".to_string());
        let mut r = record("RU1", "John Doe", "Ranchi University", 2022);
        r.grade = Some("9.1 CGPA".to_string());
        assert_eq!(
            matcher().discrepancies(&f, &r),
            vec![
                "Name mismatch: extracted \"Jon Doe\" vs registry \"John Doe\"".to_string(),
                "Grade mismatch: extracted \"8.5 CGPA\" vs registry \"9.1 CGPA\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_registry_failure_propagates() {
        let f = fields("John Doe", "Ranchi University", "2023");
        assert!(matches!(
            matcher().match_fields(&f, &DownRegistry, 2024),
            Err(CertificateError::RegistryUnavailable(_))
        ));
    }
}
