// Field-specific extraction rules for the certificate field parser
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::models::{ParsedFields, MIN_GRADUATION_YEAR};
use crate::utils::normalize_whitespace;

/// Acceptance guard: returns the cleaned value when the raw capture is acceptable.
pub type Guard = fn(&str) -> Option<String>;

/// A single pattern; capture group 1 holds the candidate value.
pub struct FieldRule {
    pub label: &'static str,
    pub pattern: Regex,
}

impl FieldRule {
    fn new(label: &'static str, pattern: &str) -> Self {
        FieldRule {
            label,
            pattern: Regex::new(pattern).expect("field rule pattern must compile"),
        }
    }

    fn captures<'t>(&'t self, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Ordered rules for one field. Earlier rules take priority.
pub struct FieldRuleSet {
    pub field: &'static str,
    pub rules: Vec<FieldRule>,
    pub guard: Guard,
}

impl FieldRuleSet {
    pub fn first_accepted(&self, text: &str) -> Option<String> {
        for rule in &self.rules {
            for raw in rule.captures(text) {
                if let Some(value) = (self.guard)(raw) {
                    debug!("{}: rule '{}' accepted {:?}", self.field, rule.label, value);
                    return Some(value);
                }
            }
        }
        None
    }
}

// Words that start the next label after a free-text value.
const NAME_END: &str = r"(?:\s+(?:son|daughter|s/o|d/o|w/o|roll|reg|registration|enrollment|has|is|was|certificate|cert|year|course|grade|cgpa|date|father|mother)\b|\s*,|\s*$)";

const INSTITUTION_KEYWORDS: [&str; 7] = [
    "university",
    "college",
    "institute",
    "school",
    "academy",
    "center",
    "centre",
];

const COURSE_STOP_WORDS: [&str; 17] = [
    "year", "roll", "reg", "registration", "certificate", "cgpa", "grade", "percentage", "marks",
    "date", "issued", "name", "session", "batch", "class", "division", "with",
];

lazy_static! {
    pub static ref NAME_RULES: FieldRuleSet = FieldRuleSet {
        field: "student_name",
        rules: vec![
            FieldRule::new(
                "labelled name",
                &format!(r"(?i)\bname(?:\s+of(?:\s+the)?\s+(?:student|candidate))?\s*[:\-]?\s*([a-z][a-z\s.]+?){}", NAME_END),
            ),
            FieldRule::new(
                "certify that",
                &format!(r"(?i)\b(?:this\s+is\s+to\s+certify\s+that|certify\s+that|certified\s+that)\s+(?:mr\.|ms\.|mrs\.|miss|shri|smt\.?)?\s*([a-z][a-z\s.]+?){}", NAME_END),
            ),
            FieldRule::new("honorific", &format!(r"(?i)\b(?:mr\.|ms\.|mrs\.|miss|shri|smt\.?)\s*([a-z][a-z\s.]+?){}", NAME_END)),
            FieldRule::new("student or candidate", &format!(r"(?i)\b(?:student|candidate)(?:'s)?(?:\s+name)?\s*[:\-]?\s*([a-z][a-z\s.]+?){}", NAME_END)),
        ],
        guard: accept_student_name,
    };

    pub static ref CERTIFICATE_RULES: FieldRuleSet = FieldRuleSet {
        field: "certificate_number",
        rules: vec![
            FieldRule::new("certificate no", r"(?i)\b(?:certificate|cert|graduation)\.?\s*(?:number|no\.?|#)\s*[:\-]?\s*([a-z0-9/\-]+)"),
            FieldRule::new("registration no", r"(?i)\b(?:registration|reg)\.?\s*(?:number|no\.?|#)\s*[:\-]?\s*([a-z0-9/\-]+)"),
            FieldRule::new("serial no", r"(?i)\b(?:serial|sr)\.?\s*(?:number|no\.?|#)\s*[:\-]?\s*([a-z0-9/\-]+)"),
            FieldRule::new("diploma no", r"(?i)\b(?:diploma|degree)\s*(?:number|no\.?|#)\s*[:\-]?\s*([a-z0-9/\-]+)"),
            FieldRule::new("prefixed code", r"(?i)(?:^|\s)([a-z]{2,4}[\d/\-]{4,})"),
        ],
        guard: accept_certificate_number,
    };

    pub static ref ROLL_RULES: FieldRuleSet = FieldRuleSet {
        field: "roll_number",
        rules: vec![
            FieldRule::new("roll no", r"\b(?i:roll)\s*(?i:number|no\.?|#)?\s*[:\-]?\s*([A-Z0-9]+)"),
            FieldRule::new("student id", r"\b(?i:student)\s*(?i:id|number|no\.?|#)\s*[:\-]?\s*([A-Z0-9]+)"),
            FieldRule::new("enrollment no", r"\b(?i:enrollment|enrolment)\s*(?i:number|no\.?|#)\s*[:\-]?\s*([A-Z0-9]+)"),
            FieldRule::new("admission no", r"\b(?i:admission)\s*(?i:number|no\.?|#)\s*[:\-]?\s*([A-Z0-9]+)"),
        ],
        guard: accept_roll_number,
    };

    pub static ref YEAR_RULES: Vec<FieldRule> = vec![
        FieldRule::new("year label", r"(?i)\b(?:year|graduated|passed|completed)\s*(?:in\s+)?[:\-]?\s*(\d{4})\b"),
        FieldRule::new("batch", r"(?i)\bbatch\s*[:\-]?\s*(?:of\s+)?(\d{4})\b"),
        FieldRule::new("session", r"(?i)\bsession\s*[:\-]?\s*(\d{4})\b"),
        FieldRule::new("class of", r"(?i)\bclass\s*(?:of\s+)?(\d{4})\b"),
    ];

    static ref STANDALONE_YEAR: Regex = Regex::new(r"\b(\d{4})\b").expect("year pattern must compile");

    pub static ref COURSE_RULES: FieldRuleSet = FieldRuleSet {
        field: "course_name",
        rules: vec![
            FieldRule::new("bachelor of", r"(?i)\b(bachelor\s+of\s+[a-z\s]+)"),
            FieldRule::new("master of", r"(?i)\b(master\s+of\s+[a-z\s]+)"),
            FieldRule::new("b.tech", r"(?i)\b(b\.?\s?tech(?:\.|\b)\s*(?:in\s+)?[a-z\s]*)"),
            FieldRule::new("m.tech", r"(?i)\b(m\.?\s?tech(?:\.|\b)\s*(?:in\s+)?[a-z\s]*)"),
            FieldRule::new("b.sc", r"(?i)\b(b\.?\s?sc(?:\.|\b)\s*(?:in\s+)?[a-z\s]*)"),
            FieldRule::new("m.sc", r"(?i)\b(m\.?\s?sc(?:\.|\b)\s*(?:in\s+)?[a-z\s]*)"),
            FieldRule::new("b.com", r"(?i)\b(b\.?\s?com(?:\.|\b)\s*[a-z\s]*)"),
            FieldRule::new("m.com", r"(?i)\b(m\.?\s?com(?:\.|\b)\s*[a-z\s]*)"),
            FieldRule::new("b.a", r"(?i)\b(b\.?a(?:\.|\b)\s*(?:in\s+)?[a-z\s]*)"),
            FieldRule::new("m.a", r"(?i)\b(m\.?a(?:\.|\b)\s*(?:in\s+)?[a-z\s]*)"),
            FieldRule::new("diploma in", r"(?i)\b(diploma\s+in\s+[a-z\s]+)"),
            FieldRule::new("phd", r"(?i)\b(ph\.?\s?d(?:\.|\b)\s*(?:in\s+)?[a-z\s]*)"),
            FieldRule::new("doctor of philosophy", r"(?i)\b(doctor\s+of\s+philosophy\s*(?:in\s+)?[a-z\s]*)"),
        ],
        guard: accept_course_name,
    };

    pub static ref GRADE_RULES: FieldRuleSet = FieldRuleSet {
        field: "grade",
        rules: vec![
            FieldRule::new("cgpa label", r"(?i)\bcgpa\s*[:\-]?\s*(\d+(?:\.\d+)?)"),
            FieldRule::new("cgpa suffix", r"(?i)(\d+(?:\.\d+)?)\s*[:\-]?\s*cgpa\b"),
            FieldRule::new("percentage label", r"(?i)\bpercentage\s*[:\-]?\s*(\d{2,3}(?:\.\d+)?)"),
            FieldRule::new("percent suffix", r"(?i)(\d{2,3}(?:\.\d+)?)\s*(?:%|percent\b|per\s+cent\b)"),
            FieldRule::new("grade label", r"(?i)\bgrade\s*[:\-]?\s*([a-f][+\-]?|\d+(?:\.\d+)?)(?:[^a-z0-9.]|$)"),
            FieldRule::new("marks label", r"(?i)\bmarks\s*[:\-]?\s*(\d+(?:\.\d+)?)"),
        ],
        guard: accept_grade,
    };

    pub static ref ISSUE_DATE_RULES: FieldRuleSet = FieldRuleSet {
        field: "issue_date",
        rules: vec![
            FieldRule::new("date label", r"(?i)\bdate\s*(?:of\s+issue)?\s*[:\-]?\s*(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})\b"),
            FieldRule::new("issued on", r"(?i)\bissued\s*[:\-]?\s*(?:on\s*)?(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})\b"),
            FieldRule::new("bare date", r"\b(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})\b"),
        ],
        guard: accept_any,
    };

    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").expect("punctuation pattern must compile");
    static ref LETTER_GRADE: Regex = Regex::new(r"^[A-F][+\-]?$").expect("grade pattern must compile");
}

fn accept_student_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    (name.len() > 2 && name.split_whitespace().count() >= 2).then(|| name.to_string())
}

fn accept_certificate_number(raw: &str) -> Option<String> {
    let number = raw.trim();
    let has_letter = number.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = number.chars().any(|c| c.is_ascii_digit());
    (number.len() >= 4 && has_letter && has_digit).then(|| number.to_string())
}

fn accept_roll_number(raw: &str) -> Option<String> {
    let roll = raw.trim();
    (roll.len() >= 4).then(|| roll.to_string())
}

fn accept_course_name(raw: &str) -> Option<String> {
    let course = trim_trailing_labels(raw);
    (course.len() > 5).then_some(course)
}

fn accept_grade(raw: &str) -> Option<String> {
    let grade = raw.trim();
    match grade.parse::<f64>() {
        Ok(value) if (0.0..=10.0).contains(&value) => Some(format!("{} CGPA", value)),
        Ok(value) if (0.0..=100.0).contains(&value) => Some(format!("{}%", value)),
        Ok(_) => None,
        Err(_) => {
            let letter = grade.to_uppercase();
            LETTER_GRADE.is_match(&letter).then_some(letter)
        }
    }
}

fn accept_any(raw: &str) -> Option<String> {
    let value = raw.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Cut a greedy course capture at the first word that starts another label.
fn trim_trailing_labels(raw: &str) -> String {
    let words: Vec<&str> = raw.split_whitespace().collect();
    let end = words
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, w)| COURSE_STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .map_or(words.len(), |(i, _)| i);
    words[..end].join(" ")
}

/// Map a matched course string to its degree family.
pub fn degree_type(course: &str) -> Option<&'static str> {
    let lower = course.to_lowercase();
    let compact: String = lower.chars().filter(|c| c.is_alphanumeric()).collect();
    let starts = |prefixes: [&str; 4]| prefixes.iter().any(|p| compact.starts_with(p));

    if lower.contains("bachelor") || starts(["btech", "bsc", "bcom", "ba"]) {
        Some("Bachelor")
    } else if lower.contains("master") || starts(["mtech", "msc", "mcom", "ma"]) {
        Some("Master")
    } else if lower.contains("diploma") {
        Some("Diploma")
    } else if lower.contains("phd") || compact.starts_with("phd") || lower.contains("doctor") {
        Some("PhD")
    } else {
        None
    }
}

/// Rule-driven extraction of structured certificate fields from recognized text.
#[derive(Debug, Clone, Copy)]
pub struct FieldParser {
    current_year: i32,
}

impl FieldParser {
    pub fn new(current_year: i32) -> Self {
        FieldParser { current_year }
    }

    /// Parse every field independently. Never fails; unmatched fields stay `None`.
    pub fn parse(&self, text: &str) -> ParsedFields {
        let normalized = normalize_whitespace(text);

        let course_name = COURSE_RULES.first_accepted(&normalized);
        let degree_type = course_name
            .as_deref()
            .and_then(degree_type)
            .map(str::to_string);

        ParsedFields {
            student_name: NAME_RULES.first_accepted(&normalized),
            certificate_number: CERTIFICATE_RULES.first_accepted(&normalized),
            roll_number: ROLL_RULES.first_accepted(&normalized),
            course_name,
            degree_type,
            institution_name: Self::extract_institution(text),
            graduation_year: self.extract_graduation_year(&normalized).map(|y| y.to_string()),
            grade: GRADE_RULES.first_accepted(&normalized),
            issue_date: ISSUE_DATE_RULES.first_accepted(&normalized),
        }
    }

    /// Most recent plausible year across labelled and standalone year tokens.
    pub fn extract_graduation_year(&self, text: &str) -> Option<i32> {
        let latest = self.current_year + 2;
        let in_range = |year: &i32| (MIN_GRADUATION_YEAR..=latest).contains(year);

        let labelled = YEAR_RULES.iter().flat_map(|rule| rule.captures(text));
        let standalone = STANDALONE_YEAR
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str());

        labelled
            .chain(standalone)
            .filter_map(|token| token.parse::<i32>().ok())
            .filter(in_range)
            .max()
    }

    /// Institution names sit near the top: scan the first ten lines only.
    pub fn extract_institution(text: &str) -> Option<String> {
        text.lines().take(10).find_map(|line| {
            let lower = line.to_lowercase();
            if !INSTITUTION_KEYWORDS.iter().any(|k| lower.contains(k)) {
                return None;
            }
            let cleaned = normalize_whitespace(&NON_WORD.replace_all(line, " "));
            (cleaned.len() > 10).then_some(cleaned)
        })
    }
}
