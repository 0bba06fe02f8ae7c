//! Tolerant extraction of structured replies
//!
//! Reasoning replies often wrap their JSON in prose or markdown fences. The
//! parser tries, in order: the whole trimmed reply, a fenced ```json block,
//! then the span from the first `{` to the last `}`. The first candidate that
//! decodes into `T` wins; otherwise the raw text is handed back.

use serde::de::DeserializeOwned;

/// Outcome of decoding a reasoning reply
#[derive(Debug, Clone, PartialEq)]
pub enum Structured<T> {
    Parsed(T),
    Raw(String),
}

impl<T> Structured<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            Structured::Parsed(value) => Some(value),
            Structured::Raw(_) => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Structured::Parsed(_))
    }
}

pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Structured<T> {
    let trimmed = text.trim();

    let candidates = [Some(trimmed), fenced_json(trimmed), brace_span(trimmed)];

    for candidate in candidates.into_iter().flatten() {
        if let Ok(value) = serde_json::from_str::<T>(candidate) {
            return Structured::Parsed(value);
        }
    }

    Structured::Raw(text.to_string())
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")?;
    let after_fence = &text[start + 7..];
    let end = after_fence.find("```")?;
    Some(after_fence[..end].trim())
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rating {
        risk_rating: String,
    }

    #[test]
    fn test_plain_json() {
        let parsed: Structured<Rating> = parse_structured(r#" {"risk_rating": "HIGH"} "#);
        assert_eq!(
            parsed,
            Structured::Parsed(Rating {
                risk_rating: "HIGH".to_string()
            })
        );
    }

    #[test]
    fn test_fenced_and_prose_wrapped() {
        let fenced = "Here you go:\n```json\n{\"risk_rating\": \"low\"}\n```\nThanks";
        assert!(parse_structured::<Rating>(fenced).is_parsed());

        let prose = "My answer is {\"risk_rating\": \"medium\"} as requested.";
        let parsed = parse_structured::<Rating>(prose).parsed().unwrap();
        assert_eq!(parsed.risk_rating, "medium");
    }

    #[test]
    fn test_raw_when_no_json() {
        let reply = "The company looks fine overall.";
        assert_eq!(
            parse_structured::<Rating>(reply),
            Structured::Raw(reply.to_string())
        );

        let broken = "{\"risk_rating\": \"high\"";
        assert!(!parse_structured::<Rating>(broken).is_parsed());

        let reversed = "} nothing here {";
        assert!(!parse_structured::<Rating>(reversed).is_parsed());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("₹₹₹₹", 2), "₹₹");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
