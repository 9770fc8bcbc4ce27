use std::{borrow::Cow, sync::Arc};

use regex::{Captures, Regex};

use crate::{cache::CompiledCache, error::FormatError};

/// Compiles a blocked-word pattern, falling back to a literal match when the
/// pattern is not a valid regex.
pub fn compile_pattern(pattern: &str) -> Result<Regex, FormatError> {
    Regex::new(pattern)
        .or_else(|_| Regex::new(&regex::escape(pattern)))
        .map_err(|source| FormatError::ConfigInvalid {
            pattern: pattern.to_string(),
            source,
        })
}

/// Masks sensitive substrings with `*`.
///
/// Every match is replaced by as many asterisks as it has characters. Patterns
/// run in list order, each against the output of the previous one.
#[derive(Default)]
pub struct PrivacyMasker {
    cache: CompiledCache<String, Option<Regex>>,
}

impl PrivacyMasker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mask<'a>(&self, text: &'a str, patterns: &Arc<[String]>) -> Cow<'a, str> {
        if patterns.is_empty() || text.is_empty() {
            return Cow::Borrowed(text);
        }
        let compiled = self
            .cache
            .get_or_compile(patterns, |pattern| compile_pattern(pattern).ok());
        let mut masked = Cow::Borrowed(text);
        for regex in compiled.iter().flatten() {
            let replaced = match regex.replace_all(&masked, |caps: &Captures| {
                "*".repeat(caps[0].chars().count())
            }) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if let Some(replaced) = replaced {
                masked = Cow::Owned(replaced);
            }
        }
        masked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Arc<[String]> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_mask_literal_and_regex() {
        let masker = PrivacyMasker::new();
        let out = masker.mask("password: 123456789", &patterns(&["password", "[0-9]{9}"]));
        assert_eq!(out, "********: *********");
    }

    #[test]
    fn test_mask_uses_matched_length() {
        let masker = PrivacyMasker::new();
        let out = masker.mask("id=42 id=1234", &patterns(&[r"\d+"]));
        assert_eq!(out, "id=** id=****");
    }

    #[test]
    fn test_mask_counts_characters() {
        let masker = PrivacyMasker::new();
        let out = masker.mask("hi héllo", &patterns(&["héllo"]));
        assert_eq!(out, "hi *****");
    }

    #[test]
    fn test_invalid_regex_degrades_to_literal() {
        let masker = PrivacyMasker::new();
        let out = masker.mask("token [abc and abc", &patterns(&["[abc"]));
        assert_eq!(out, "token **** and abc");
    }

    #[test]
    fn test_empty_patterns_borrow() {
        let masker = PrivacyMasker::new();
        assert!(matches!(masker.mask("secret", &patterns(&[])), Cow::Borrowed("secret")));
    }

    #[test]
    fn test_mask_is_idempotent() {
        let masker = PrivacyMasker::new();
        let list = patterns(&["world", "[0-9]{9}"]);
        let once = masker.mask("hello world !! 123456789", &list).into_owned();
        let twice = masker.mask(&once, &list).into_owned();
        assert_eq!(once, "hello ***** !! *********");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_compile_pattern_reports_nothing_for_escapable() {
        assert!(compile_pattern("(unclosed").is_ok());
        assert!(compile_pattern("a+").unwrap().is_match("aaa"));
    }
}
