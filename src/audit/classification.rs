//! Keyword-based data classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse sensitivity tier attached to a request for audit purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataClassification {
    #[default]
    Public,
    Confidential,
    Restricted,
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataClassification::Public => "public",
            DataClassification::Confidential => "confidential",
            DataClassification::Restricted => "restricted",
        };
        f.write_str(s)
    }
}

/// Clinical and identity data.
const RESTRICTED_KEYWORDS: &[&str] = &[
    "patient",
    "medical",
    "diagnosis",
    "diagnoses",
    "diagnostic",
    "prescription",
    "treatment",
    "clinical",
    "health-record",
    "cpf",
    "lab-result",
    "exam",
];

/// Personal and business data.
const CONFIDENTIAL_KEYWORDS: &[&str] = &[
    "user",
    "profile",
    "appointment",
    "billing",
    "payment",
    "invoice",
    "email",
    "phone",
    "address",
    "account",
];

/// Classify free text by the most sensitive keyword it contains.
///
/// Text is split into words on any non-alphanumeric character, so
/// `/api/lab_results` matches `lab-result` but `example.com` does not match
/// `exam`. A trailing plural `s`/`es` on a word is ignored.
pub fn classify<'a>(parts: impl IntoIterator<Item = &'a str>) -> DataClassification {
    let mut level = DataClassification::Public;
    for part in parts {
        let text = part.to_ascii_lowercase();
        let words: Vec<&str> = text.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty()).collect();
        if RESTRICTED_KEYWORDS.iter().any(|k| contains_keyword(&words, k)) {
            return DataClassification::Restricted;
        }
        if CONFIDENTIAL_KEYWORDS.iter().any(|k| contains_keyword(&words, k)) {
            level = DataClassification::Confidential;
        }
    }
    level
}

/// Hyphenated keywords must appear as consecutive words.
fn contains_keyword(words: &[&str], keyword: &str) -> bool {
    let parts: Vec<&str> = keyword.split('-').collect();
    words.windows(parts.len()).any(|window| {
        window
            .iter()
            .zip(&parts)
            .all(|(word, part)| word_matches(word, part))
    })
}

fn word_matches(word: &str, keyword: &str) -> bool {
    word == keyword || word.strip_suffix('s') == Some(keyword) || word.strip_suffix("es") == Some(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_wins() {
        let level = classify(["/api/users", "GET /patients/42/prescriptions"]);
        assert_eq!(level, DataClassification::Restricted);
    }

    #[test]
    fn test_confidential_and_public() {
        assert_eq!(classify(["/api/appointments"]), DataClassification::Confidential);
        assert_eq!(classify(["/api/status", "cache"]), DataClassification::Public);
        assert_eq!(classify(Vec::<&str>::new()), DataClassification::Public);
    }

    #[test]
    fn test_matches_whole_words_only() {
        assert_eq!(classify(["http://example.com/health"]), DataClassification::Public);
        assert_eq!(classify(["/admin/superuser-tools"]), DataClassification::Public);
        assert_eq!(classify(["/api/exams/42"]), DataClassification::Restricted);
        assert_eq!(classify(["/api/lab_results"]), DataClassification::Restricted);
        assert_eq!(classify(["/api/results/lab"]), DataClassification::Public);
        assert_eq!(classify(["/users/7/profile"]), DataClassification::Confidential);
        assert_eq!(classify(["GET /addresses"]), DataClassification::Confidential);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify(["Medical-Records"]), DataClassification::Restricted);
    }
}
