use regex::Regex;
use std::sync::OnceLock;

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9][0-9,]*").expect("static regex"))
}

fn color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"background-color:\s*(#[0-9a-fA-F]{6})").expect("static regex")
    })
}

/// First integer in text such as `"1,234 stars today"`; 0 when there is none.
pub fn extract_int(text: &str) -> u64 {
    let Some(found) = number_re().find(text) else {
        return 0;
    };
    let digits = found.as_str().replace(',', "");
    match digits.parse() {
        Ok(n) => n,
        Err(e) => {
            tracing::debug!("Failed to parse number '{}' from '{}': {}", digits, text, e);
            0
        }
    }
}

/// Hex colour from a style attribute like `background-color: #3178c6`.
pub fn extract_color(style: &str) -> Option<String> {
    color_re()
        .captures(style)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Collapses runs of whitespace (HTML text nodes are full of newlines).
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_int_with_commas() {
        assert_eq!(extract_int("1,234 stars today"), 1234);
    }

    #[test]
    fn test_extract_int_plain() {
        assert_eq!(extract_int("  553 "), 553);
    }

    #[test]
    fn test_extract_int_missing() {
        assert_eq!(extract_int("no stars"), 0);
        assert_eq!(extract_int(""), 0);
    }

    #[test]
    fn test_extract_int_overflow_is_zero() {
        assert_eq!(extract_int("99999999999999999999999"), 0);
    }

    #[test]
    fn test_extract_color() {
        assert_eq!(
            extract_color("background-color: #3178c6"),
            Some("#3178c6".to_string())
        );
        assert_eq!(
            extract_color("color: red; background-color:#DEA584;"),
            Some("#DEA584".to_string())
        );
        assert_eq!(extract_color("background-color: red"), None);
    }

    #[test]
    fn test_squash_whitespace() {
        assert_eq!(squash_whitespace("\n  torvalds /\n   linux \n"), "torvalds / linux");
    }
}
