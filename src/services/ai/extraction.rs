use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::models::{ExtractedEntities, ExtractedIntent, Field, Intent};
use crate::services::ai::{LlmProvider, Message};

const SYSTEM_PROMPT: &str = r#"You extract structured restaurant booking information from a user's message.

Return ONLY a valid JSON object (no markdown, no explanation) with this exact structure:
{
  "intent": "greeting|booking|cancel|other",
  "entities": {
    "city": "e.g. Delhi, Mumbai, or null",
    "cuisine": "e.g. North Indian, Italian, or null",
    "features": ["e.g. rooftop", "romantic dinner"],
    "date": "YYYY-MM-DD or null",
    "time": "e.g. 7 PM, 19:00, or null",
    "number_of_people": 2,
    "restaurant_name": "a specific restaurant if mentioned, or null",
    "contact_name": "full name or null",
    "contact_email": "email address or null",
    "contact_number": "phone number or null"
  }
}

Rules:
- Use null for anything the message does not mention.
- Convert relative dates such as "tomorrow" or "next Friday" to YYYY-MM-DD using today's date below.
- features only lists phrases explicitly present in the message.
- number_of_people is a bare integer ("a couple" is 2, "group of 5" is 5).
"#;

/// Result of one call to the extraction service.
///
/// Every variant other than `Parsed` degrades to an unknown intent with no
/// entities, but callers can still tell "nothing extracted" from "the service
/// misbehaved".
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Parsed(ExtractedIntent),
    Empty,
    Malformed { reason: String },
    Unavailable { reason: String },
}

impl Extraction {
    pub fn status(&self) -> &'static str {
        match self {
            Extraction::Parsed(_) => "parsed",
            Extraction::Empty => "empty",
            Extraction::Malformed { .. } => "malformed",
            Extraction::Unavailable { .. } => "unavailable",
        }
    }

    pub fn into_intent(self) -> ExtractedIntent {
        match self {
            Extraction::Parsed(intent) => intent,
            _ => ExtractedIntent::unknown(),
        }
    }
}

pub async fn extract_intent(
    llm: &dyn LlmProvider,
    user_input: &str,
    today: NaiveDate,
    timeout: Duration,
) -> Extraction {
    let system = format!(
        "{SYSTEM_PROMPT}\nToday's date is {}.",
        today.format("%Y-%m-%d")
    );
    let messages = [Message {
        role: "user".to_string(),
        content: user_input.to_string(),
    }];

    match tokio::time::timeout(timeout, llm.chat(&system, &messages)).await {
        Ok(Ok(response)) => {
            let extraction = parse_extraction(&response);
            if let Extraction::Malformed { reason } = &extraction {
                tracing::warn!(reason = %reason, "malformed extraction output, treating as empty");
            }
            extraction
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "extraction service failed");
            Extraction::Unavailable {
                reason: e.to_string(),
            }
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "extraction service timed out");
            Extraction::Unavailable {
                reason: "timed out".to_string(),
            }
        }
    }
}

pub fn parse_extraction(response: &str) -> Extraction {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Extraction::Empty;
    }
    if trimmed.to_lowercase().starts_with("error:") {
        return Extraction::Malformed {
            reason: "service reported an error".to_string(),
        };
    }

    // Strip markdown code fences
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    let mut candidates = vec![cleaned];
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            candidates.push(&cleaned[start..=end]);
        }
    }

    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(obj)) => return from_object(&obj),
            Ok(_) => {
                return Extraction::Malformed {
                    reason: "response is JSON but not an object".to_string(),
                }
            }
            Err(_) => continue,
        }
    }

    Extraction::Malformed {
        reason: "no JSON object in response".to_string(),
    }
}

fn from_object(obj: &Map<String, Value>) -> Extraction {
    let intent = obj
        .get("intent")
        .and_then(Value::as_str)
        .map(Intent::parse)
        .unwrap_or(Intent::Unknown);

    // Some models nest the entities as a JSON string.
    let entities = match obj.get("entities") {
        Some(Value::Object(map)) => entities_from(map),
        Some(Value::String(s)) => serde_json::from_str::<Map<String, Value>>(s)
            .map(|map| entities_from(&map))
            .unwrap_or_default(),
        _ => ExtractedEntities::default(),
    };

    if intent == Intent::Unknown && entities.is_empty() && !obj.contains_key("intent") {
        return Extraction::Empty;
    }

    Extraction::Parsed(ExtractedIntent { intent, entities })
}

fn entities_from(map: &Map<String, Value>) -> ExtractedEntities {
    let mut entities = ExtractedEntities::default();

    for field in Field::BOOKING {
        if let Some(value) = map.get(field.key()).and_then(scalar_text) {
            entities.fields.insert(field, value);
        }
    }

    entities.features = match map.get("features") {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(v) => scalar_text(v).into_iter().collect(),
        None => vec![],
    };

    entities
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && !s.eq_ignore_ascii_case("null")).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn parsed(response: &str) -> ExtractedIntent {
        match parse_extraction(response) {
            Extraction::Parsed(intent) => intent,
            other => panic!("expected parsed extraction, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"intent":"booking","entities":{"city":"Delhi","cuisine":"North Indian","features":["rooftop"],"date":"2025-06-06","time":"7 PM","number_of_people":4,"restaurant_name":null,"contact_name":null,"contact_email":null,"contact_number":null}}"#;
        let result = parsed(json);
        assert_eq!(result.intent, Intent::Booking);
        assert_eq!(result.entities.fields.get(&Field::City).unwrap(), "Delhi");
        assert_eq!(result.entities.fields.get(&Field::NumberOfPeople).unwrap(), "4");
        assert!(!result.entities.fields.contains_key(&Field::RestaurantName));
        assert_eq!(result.entities.features, vec!["rooftop"]);
    }

    #[test]
    fn test_parse_markdown_fenced_json() {
        let json = "```json\n{\"intent\":\"cancel\",\"entities\":{\"contact_email\":\"a@b.com\"}}\n```";
        let result = parsed(json);
        assert_eq!(result.intent, Intent::Cancel);
        assert_eq!(result.entities.fields.get(&Field::ContactEmail).unwrap(), "a@b.com");
    }

    #[test]
    fn test_parse_json_inside_prose() {
        let raw = "Sure! Here you go: {\"intent\":\"greeting\",\"entities\":{}} Hope that helps.";
        assert_eq!(parsed(raw).intent, Intent::Greeting);
    }

    #[test]
    fn test_entities_as_string() {
        let raw = r#"{"intent":"booking","entities":"{\"city\":\"Mumbai\"}"}"#;
        let result = parsed(raw);
        assert_eq!(result.entities.fields.get(&Field::City).unwrap(), "Mumbai");
    }

    #[test]
    fn test_null_intent_is_unknown() {
        let raw = r#"{"intent":null,"entities":{"city":"Pune"}}"#;
        let result = parsed(raw);
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.entities.fields.len(), 1);
    }

    #[test]
    fn test_empty_and_blank_objects() {
        assert_eq!(parse_extraction(""), Extraction::Empty);
        assert_eq!(parse_extraction("   \n"), Extraction::Empty);
        assert_eq!(parse_extraction("{}"), Extraction::Empty);
    }

    #[test]
    fn test_malformed_output() {
        for raw in ["I don't understand", "[1,2,3]", "{\"intent\": \"booking\"", "Error: quota exceeded"] {
            let extraction = parse_extraction(raw);
            assert!(
                matches!(extraction, Extraction::Malformed { .. }),
                "{raw:?} gave {extraction:?}"
            );
            assert_eq!(extraction.into_intent(), ExtractedIntent::unknown());
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmProvider for FailingLlm {
        async fn chat(&self, _system_prompt: &str, _messages: &[Message]) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    struct SlowLlm;

    #[async_trait]
    impl LlmProvider for SlowLlm {
        async fn chat(&self, _system_prompt: &str, _messages: &[Message]) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(r#"{"intent":"booking","entities":{}}"#.to_string())
        }
    }

    struct EchoDateLlm;

    #[async_trait]
    impl LlmProvider for EchoDateLlm {
        async fn chat(&self, system_prompt: &str, _messages: &[Message]) -> anyhow::Result<String> {
            assert!(system_prompt.contains("Today's date is 2025-06-01."));
            Ok(r#"{"intent":"booking","entities":{"date":"2025-06-02"}}"#.to_string())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_provider_error_is_unavailable() {
        let extraction = extract_intent(&FailingLlm, "hi", today(), Duration::from_secs(1)).await;
        assert!(matches!(extraction, Extraction::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_provider_timeout_is_unavailable() {
        let extraction = extract_intent(&SlowLlm, "hi", today(), Duration::from_millis(50)).await;
        assert_eq!(extraction.status(), "unavailable");
    }

    #[tokio::test]
    async fn test_reference_date_reaches_prompt() {
        let extraction =
            extract_intent(&EchoDateLlm, "book tomorrow", today(), Duration::from_secs(1)).await;
        let intent = extraction.into_intent();
        assert_eq!(intent.entities.fields.get(&Field::Date).unwrap(), "2025-06-02");
    }
}
