use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_REGEX: Option<Regex> =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok();
    static ref PHONE_REGEX: Option<Regex> =
        Regex::new(r"\b(?:\+1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})\b").ok();
    // Decimal-degree pairs with at least four fractional digits (~11 m precision)
    static ref COORDINATE_REGEX: Option<Regex> =
        Regex::new(r"-?\b\d{1,3}\.\d{4,}\s*,\s*-?\d{1,3}\.\d{4,}\b").ok();
    static ref DEFAULT_REDACTOR: PiiRedactor = PiiRedactor::new(RedactionConfig::default());
}

/// What the redactor scrubs from log text
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    /// Site coordinates of customer plants
    pub redact_coordinates: bool,
    /// Replace matches with a short hash so repeated values can be correlated
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<(Regex, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_coordinates: true,
            hash_for_correlation: false,
            custom_patterns: Vec::new(),
        }
    }
}

/// PII redactor for log messages
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_emails {
            result = self.replace(&EMAIL_REGEX, &result, "EMAIL", "***@***");
        }

        if self.config.redact_coordinates {
            result = self.replace(&COORDINATE_REGEX, &result, "COORDS", "[coordinates]");
        }

        if self.config.redact_phones {
            result = self.replace(&PHONE_REGEX, &result, "PHONE", "(***) ***-****");
        }

        for (pattern, replacement) in &self.config.custom_patterns {
            result = pattern.replace_all(&result, replacement.as_str()).to_string();
        }

        result
    }

    fn replace(&self, pattern: &Option<Regex>, text: &str, label: &str, mask: &str) -> String {
        let Some(pattern) = pattern else {
            return text.to_string();
        };

        pattern
            .replace_all(text, |caps: &regex::Captures| {
                if self.config.hash_for_correlation {
                    format!("{}[{}]", label, Self::hash_value(&caps[0]))
                } else {
                    mask.to_string()
                }
            })
            .to_string()
    }

    fn hash_value(value: &str) -> String {
        let digest = Sha256::digest(value.as_bytes());
        general_purpose::STANDARD_NO_PAD.encode(&digest[..8])
    }
}

/// Redact with the default configuration
pub fn redact(text: &str) -> String {
    DEFAULT_REDACTOR.redact(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert!(EMAIL_REGEX.is_some());
        assert!(PHONE_REGEX.is_some());
        assert!(COORDINATE_REGEX.is_some());
    }

    #[test]
    fn test_email_redaction() {
        let redacted = redact("upload rejected for tech.jones@acme-valve.com");
        assert_eq!(redacted, "upload rejected for ***@***");
    }

    #[test]
    fn test_phone_redaction() {
        let redacted = redact("site contact (555) 123-4567");
        assert!(redacted.contains("(***) ***-****"));
        assert!(!redacted.contains("123-4567"));
    }

    #[test]
    fn test_coordinate_redaction() {
        let redacted = redact("record at 29.7604123, -95.3698456 failed");
        assert_eq!(redacted, "record at [coordinates] failed");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "duplicate key value violates unique constraint \"valve_records_pkey\"";
        assert_eq!(redact(text), text);
    }

    #[test]
    fn test_hash_for_correlation() {
        let redactor = PiiRedactor::new(RedactionConfig {
            hash_for_correlation: true,
            ..Default::default()
        });

        let a = redactor.redact("a@b.io");
        let b = redactor.redact("a@b.io");
        assert!(a.starts_with("EMAIL["));
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_pattern() {
        let redactor = PiiRedactor::new(RedactionConfig {
            custom_patterns: vec![(Regex::new(r"SN-\d+").unwrap(), "SN-[REDACTED]".into())],
            ..Default::default()
        });

        assert_eq!(redactor.redact("serial SN-1042"), "serial SN-[REDACTED]");
    }
}
