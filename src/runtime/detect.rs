//! Static scan deciding whether a program needs an interactive session.

use once_cell::sync::Lazy;
use regex::Regex;

static INPUT_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:raw_)?input\s*\(").expect("input-call pattern is valid")
});

/// Whether `source` appears to call `input(` or `raw_input(`.
///
/// The scan is textual: case and whitespace before the parenthesis are
/// ignored, and occurrences inside comments or string literals count.
pub fn looks_interactive(source: &str) -> bool {
    INPUT_CALL.is_match(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_plain_and_spaced_calls() {
        assert!(looks_interactive("name = input('Name: ')"));
        assert!(looks_interactive("x = INPUT  ()"));
        assert!(looks_interactive("x = raw_input(\"?\")"));
    }

    #[test]
    fn test_ignores_lookalike_identifiers() {
        assert!(!looks_interactive("user_input = 3\nprint(user_input)"));
        assert!(!looks_interactive("inputs(1)"));
        assert!(!looks_interactive("print('hello')"));
    }

    #[test]
    fn test_matches_inside_comments_and_strings() {
        assert!(looks_interactive("# call input() later\nprint(1)"));
        assert!(looks_interactive("print('use input(x)')"));
    }
}
