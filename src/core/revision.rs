//! Letter revision codes (A, B, ..., Z, AA, AB, ...)
//!
//! Codes are bijective base-26 numerals: there is no zero digit, so `A` is 1,
//! `Z` is 26 and `AA` is 27. Ordering is by length first, then lexicographic.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised for malformed revision codes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevisionError {
    #[error("invalid revision code '{0}': expected one or more letters A-Z")]
    InvalidRevisionCode(String),
}

/// A validated revision code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionCode(String);

impl RevisionCode {
    /// The first revision ever allocated
    pub fn first() -> Self {
        Self("A".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The successor of this code
    pub fn next(&self) -> Self {
        let mut bytes = self.0.as_bytes().to_vec();
        let mut i = bytes.len();
        loop {
            if i == 0 {
                bytes.insert(0, b'A');
                break;
            }
            i -= 1;
            if bytes[i] == b'Z' {
                bytes[i] = b'A';
            } else {
                bytes[i] += 1;
                break;
            }
        }
        Self(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The predecessor of this code, `None` for `A`
    pub fn previous(&self) -> Option<Self> {
        let mut bytes = self.0.as_bytes().to_vec();
        let mut i = bytes.len();
        while i > 0 {
            i -= 1;
            if bytes[i] != b'A' {
                bytes[i] -= 1;
                break;
            }
            bytes[i] = b'Z';
            if i == 0 {
                // borrowed through the leading digit
                bytes.remove(0);
            }
        }
        if bytes.is_empty() {
            None
        } else {
            Some(Self(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

impl Ord for RevisionCode {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_revision_codes(&self.0, &other.0)
    }
}

impl PartialOrd for RevisionCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RevisionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RevisionCode {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if validate_revision_code(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(RevisionError::InvalidRevisionCode(s.to_string()))
        }
    }
}

impl TryFrom<String> for RevisionCode {
    type Error = RevisionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RevisionCode> for String {
    fn from(code: RevisionCode) -> Self {
        code.0
    }
}

/// Allocate the revision following `current`; no current revision yields `A`
pub fn next_revision_code(current: Option<&str>) -> Result<String, RevisionError> {
    match current {
        None => Ok(RevisionCode::first().into()),
        Some(code) => Ok(code.parse::<RevisionCode>()?.next().into()),
    }
}

/// Inverse of [`next_revision_code`]; `A` has no predecessor
pub fn previous_revision_code(current: &str) -> Result<Option<String>, RevisionError> {
    Ok(current
        .parse::<RevisionCode>()?
        .previous()
        .map(String::from))
}

/// True iff `code` is non-empty and made only of uppercase A-Z
pub fn validate_revision_code(code: &str) -> bool {
    !code.is_empty() && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Shorter codes sort first; equal lengths compare lexicographically
pub fn compare_revision_codes(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Stable sort returning a new vector; the input is left untouched
pub fn sort_revision_codes<S: AsRef<str>>(codes: &[S]) -> Vec<String> {
    let mut sorted: Vec<String> = codes.iter().map(|c| c.as_ref().to_string()).collect();
    sorted.sort_by(|a, b| compare_revision_codes(a, b));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_from_nothing() {
        assert_eq!(next_revision_code(None).unwrap(), "A");
    }

    #[test]
    fn test_next_with_carry() {
        assert_eq!(next_revision_code(Some("A")).unwrap(), "B");
        assert_eq!(next_revision_code(Some("B")).unwrap(), "C");
        assert_eq!(next_revision_code(Some("Z")).unwrap(), "AA");
        assert_eq!(next_revision_code(Some("AZ")).unwrap(), "BA");
        assert_eq!(next_revision_code(Some("ZZ")).unwrap(), "AAA");
        assert_eq!(next_revision_code(Some("AZZ")).unwrap(), "BAA");
    }

    #[test]
    fn test_previous_with_borrow() {
        assert_eq!(previous_revision_code("A").unwrap(), None);
        assert_eq!(previous_revision_code("B").unwrap().as_deref(), Some("A"));
        assert_eq!(previous_revision_code("AA").unwrap().as_deref(), Some("Z"));
        assert_eq!(previous_revision_code("BA").unwrap().as_deref(), Some("AZ"));
        assert_eq!(previous_revision_code("AAA").unwrap().as_deref(), Some("ZZ"));
        assert_eq!(previous_revision_code("AB").unwrap().as_deref(), Some("AA"));
    }

    #[test]
    fn test_invalid_codes_rejected() {
        for bad in ["", "a", "A1", "-", "Ä", "AB C"] {
            assert!(!validate_revision_code(bad), "{bad:?} should be invalid");
            assert_eq!(
                next_revision_code(Some(bad)).unwrap_err(),
                RevisionError::InvalidRevisionCode(bad.to_string())
            );
            assert!(previous_revision_code(bad).is_err());
        }
        assert!(validate_revision_code("ZZTOP"));
    }

    #[test]
    fn test_previous_undoes_next() {
        let mut code = RevisionCode::first();
        for _ in 0..2000 {
            let next = code.next();
            assert_eq!(next.previous().as_ref(), Some(&code));
            assert!(next > code);
            code = next;
        }
        // 2001 = 2*676 + 24*26 + 25 -> "BXY"
        assert_eq!(code.as_str(), "BXY");
    }

    #[test]
    fn test_compare_length_first() {
        assert_eq!(compare_revision_codes("Z", "AA"), Ordering::Less);
        assert_eq!(compare_revision_codes("AA", "Z"), Ordering::Greater);
        assert_eq!(compare_revision_codes("AB", "AB"), Ordering::Equal);
        assert_eq!(compare_revision_codes("AB", "BA"), Ordering::Less);
    }

    #[test]
    fn test_sort_does_not_mutate_input() {
        let input = vec!["Z", "AA", "A"];
        assert_eq!(sort_revision_codes(&input), vec!["A", "Z", "AA"]);
        assert_eq!(input, vec!["Z", "AA", "A"]);
    }

    #[test]
    fn test_serde_rejects_bad_code() {
        let code: RevisionCode = serde_json::from_str("\"AC\"").unwrap();
        assert_eq!(code.as_str(), "AC");
        assert!(serde_json::from_str::<RevisionCode>("\"ac\"").is_err());
    }
}
