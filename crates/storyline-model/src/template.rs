//! `{placeholder}` scanning and substitution for sentence formats.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is a valid regex"))
}

/// Distinct placeholder names in `format`, in order of first appearance.
pub fn substitutions(format: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for capture in placeholder_pattern().captures_iter(format) {
        let key = capture[1].trim();
        if !key.is_empty() && !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Replace every `{key}` in `format` with its value. Unknown placeholders are
/// left untouched.
pub fn substitute(format: &str, values: &BTreeMap<String, String>) -> String {
    placeholder_pattern()
        .replace_all(format, |caps: &regex::Captures<'_>| {
            let key = caps[1].trim();
            match values.get(key) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutions_in_order() {
        assert_eq!(substitutions("{x} plus {y}"), vec!["x", "y"]);
    }

    #[test]
    fn test_substitutions_are_distinct() {
        assert_eq!(
            substitutions("{b} then {a} then {b} again"),
            vec!["b", "a"]
        );
    }

    #[test]
    fn test_no_placeholders() {
        assert!(substitutions("nothing to see here").is_empty());
        assert!(substitutions("").is_empty());
    }

    #[test]
    fn test_empty_braces_ignored() {
        assert_eq!(substitutions("{} and {name}"), vec!["name"]);
    }

    #[test]
    fn test_substitute_known_and_unknown() {
        let mut values = BTreeMap::new();
        values.insert("x".to_string(), "1".to_string());
        assert_eq!(substitute("{x} plus {y}", &values), "1 plus {y}");
    }
}
