// src/services/reply_parser.rs
use crate::errors::BotError;
use crate::models::ModelReply;
use once_cell::sync::Lazy;
use regex::Regex;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").expect("valid fence regex"));

static JSON_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\{[\s\S]*\}|\[[\s\S]*\])").expect("valid span regex"));

/// Pulls the JSON document out of a model reply that may wrap it in a
/// markdown fence or surround it with prose.
pub fn extract_json(text: &str) -> &str {
    let mut text = text.trim();

    if let Some(body) = FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
        text = body.as_str().trim();
    }

    match JSON_SPAN.find(text) {
        Some(span) => span.as_str(),
        None => text,
    }
}

/// Parses and validates a typed reply. Anything that does not fit the
/// expected shape is a `MalformedResponse`.
pub fn parse_reply<T: ModelReply>(text: &str) -> Result<T, BotError> {
    let json = extract_json(text);
    let reply: T = serde_json::from_str(json).map_err(|e| {
        BotError::MalformedResponse(format!("{} in reply: {}", e, preview(text, 500)))
    })?;
    reply.validate().map_err(BotError::MalformedResponse)?;
    Ok(reply)
}

/// First `max_chars` characters, for log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KeywordSet, SlidePlan};

    #[test]
    fn strips_json_fence() {
        let reply = "```json\n{\"keywords\": [\"a\"]}\n```";
        assert_eq!(extract_json(reply), "{\"keywords\": [\"a\"]}");
    }

    #[test]
    fn strips_untagged_fence_and_prose() {
        let reply = "Вот результат:\n```\n{\"a\": 1}\n```\nУдачи!";
        assert_eq!(extract_json(reply), "{\"a\": 1}");
    }

    #[test]
    fn finds_object_inside_prose_without_fence() {
        let reply = "Конечно! {\"a\": {\"b\": 2}} Надеюсь, помог.";
        assert_eq!(extract_json(reply), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn returns_trimmed_text_without_json() {
        assert_eq!(extract_json("  no json here  "), "no json here");
    }

    #[test]
    fn parses_typed_keywords() {
        let reply = "```json\n{\"high_frequency\": [\"платье\"], \"low_frequency\": [\"платье летнее льняное\"]}\n```";
        let set: KeywordSet = parse_reply(reply).unwrap();
        assert_eq!(set.high_frequency, vec!["платье"]);
        assert!(set.mid_frequency.is_empty());
    }

    #[test]
    fn rejects_invalid_json() {
        let err = parse_reply::<KeywordSet>("{\"keywords\": [").unwrap_err();
        assert!(matches!(err, BotError::MalformedResponse(_)));
    }

    #[test]
    fn rejects_reply_failing_validation() {
        let err = parse_reply::<SlidePlan>("{\"style_guide\": \"clean\", \"prompts\": []}").unwrap_err();
        assert!(matches!(err, BotError::MalformedResponse(msg) if msg.contains("no prompts")));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("привет", 3), "при...");
        assert_eq!(preview("да", 3), "да");
    }
}
