//! Converts inbound chat payloads into a canonical, capped message sequence.
//!
//! Expected shape (all of it optional):
//! `{"parts": [{"kind": "text", "text": "<query>"}, {"kind": "data", "data": [<history items>]}]}`
//! where every history item is itself `{"kind": "text", "text": ...}`.

use serde_json::Value;
use std::collections::HashSet;

use crate::models::{Message, Part, Role};
use crate::utils::sanitize;

/// Query and history extracted from a payload, before conversion to messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedPayload {
    /// Sanitized history texts, oldest first, already capped
    pub history: Vec<String>,
    /// Sanitized current query; `None` when missing or empty
    pub query: Option<String>,
}

impl NormalizedPayload {
    /// Alternating `user`/`agent` history followed by the query as a `user` message.
    pub fn into_messages(self) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .history
            .into_iter()
            .enumerate()
            .map(|(i, text)| Message::new(Role::alternating(i), vec![Part::text(text)]))
            .collect();

        if let Some(query) = self.query {
            messages.push(Message::user(query));
        }

        messages
    }

    pub fn len(&self) -> usize {
        self.history.len() + usize::from(self.query.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct MessageNormalizer {
    default_cap: usize,
}

impl MessageNormalizer {
    pub fn new(default_cap: usize) -> Self {
        Self { default_cap }
    }

    /// Canonical message sequence for `raw`, at most `history_cap` (or the
    /// default cap) messages long. Malformed input yields an empty sequence.
    pub fn normalize(&self, raw: &Value, history_cap: Option<usize>) -> Vec<Message> {
        self.extract(raw, history_cap).into_messages()
    }

    pub fn extract(&self, raw: &Value, history_cap: Option<usize>) -> NormalizedPayload {
        let cap = history_cap.unwrap_or(self.default_cap);
        let Some(parts) = raw.get("parts").and_then(Value::as_array) else {
            return NormalizedPayload::default();
        };
        if parts.is_empty() || cap == 0 {
            return NormalizedPayload::default();
        }

        // Only the leading part can carry the query.
        let query = parts
            .first()
            .filter(|part| kind_of(part) == Some("text"))
            .and_then(|part| part.get("text"))
            .and_then(Value::as_str)
            .map(sanitize)
            .filter(|text| !text.is_empty());

        // First data part holding a list wins; later data parts are ignored.
        let source = parts.iter().find_map(|part| {
            if kind_of(part) == Some("data") {
                part.get("data").and_then(Value::as_array)
            } else {
                None
            }
        });

        let mut history = source
            .map(|items| collect_history(items, cap))
            .unwrap_or_default();

        let keep = cap - 1;
        if history.len() > keep {
            history.drain(..history.len() - keep);
        }

        NormalizedPayload { history, query }
    }
}

fn kind_of(value: &Value) -> Option<&str> {
    value.get("kind").and_then(Value::as_str)
}

/// Sanitize and deduplicate the newest `2 * cap` text items, first occurrence winning.
fn collect_history(items: &[Value], cap: usize) -> Vec<String> {
    let window = cap.saturating_mul(2);
    let recent = &items[items.len().saturating_sub(window)..];

    let mut seen: HashSet<String> = HashSet::with_capacity(recent.len());
    let mut texts = Vec::with_capacity(recent.len());

    for item in recent {
        if kind_of(item) != Some("text") {
            continue;
        }
        let Some(raw_text) = item.get("text").and_then(Value::as_str) else {
            continue;
        };
        if raw_text.is_empty() {
            continue;
        }

        let clean = sanitize(raw_text);
        if clean.is_empty() || seen.contains(&clean) {
            continue;
        }
        seen.insert(clean.clone());
        texts.push(clean);
    }

    texts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(query: &str, history: usize) -> Value {
        let items: Vec<Value> = (0..history)
            .map(|i| json!({"kind": "text", "text": format!("Message {}", i)}))
            .collect();
        json!({
            "parts": [
                {"kind": "text", "text": query},
                {"kind": "data", "data": items}
            ]
        })
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.first_text().unwrap_or_default()).collect()
    }

    #[test]
    fn test_empty_payload() {
        let normalizer = MessageNormalizer::new(8);
        assert!(normalizer.normalize(&json!({}), None).is_empty());
        assert!(normalizer.normalize(&json!(null), None).is_empty());
        assert!(normalizer.normalize(&json!({"parts": "nope"}), None).is_empty());
        assert!(normalizer.normalize(&json!({"parts": []}), None).is_empty());
    }

    #[test]
    fn test_query_only() {
        let normalizer = MessageNormalizer::new(8);
        let raw = json!({"parts": [{"kind": "text", "text": "How do I learn Python?"}]});

        let result = normalizer.normalize(&raw, None);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].role, Role::User);
        assert_eq!(result[0].first_text(), Some("How do I learn Python?"));
    }

    #[test]
    fn test_history_capping_keeps_newest() {
        let normalizer = MessageNormalizer::new(8);

        let result = normalizer.normalize(&payload("Current query", 20), None);

        assert_eq!(result.len(), 8);
        assert_eq!(result.last().unwrap().first_text(), Some("Current query"));
        assert_eq!(
            texts(&result[..7]),
            vec![
                "Message 13", "Message 14", "Message 15", "Message 16", "Message 17",
                "Message 18", "Message 19"
            ]
        );
    }

    #[test]
    fn test_custom_history_cap() {
        let normalizer = MessageNormalizer::new(8);
        let result = normalizer.normalize(&payload("Current query", 10), Some(4));

        assert_eq!(result.len(), 4);
        assert_eq!(texts(&result), vec!["Message 7", "Message 8", "Message 9", "Current query"]);
    }

    #[test]
    fn test_cap_invariant_holds_for_all_caps() {
        let normalizer = MessageNormalizer::new(8);
        for cap in 0..12 {
            for history in [0, 1, 5, 30] {
                let with_query = normalizer.normalize(&payload("Q", history), Some(cap));
                assert!(with_query.len() <= cap, "cap={} history={}", cap, history);

                let without_query = normalizer.normalize(&payload("  ", history), Some(cap));
                assert!(without_query.len() <= cap, "cap={} history={}", cap, history);
            }
        }
    }

    #[test]
    fn test_cap_one_keeps_only_query() {
        let normalizer = MessageNormalizer::new(8);
        let result = normalizer.normalize(&payload("Q", 5), Some(1));
        assert_eq!(texts(&result), vec!["Q"]);
    }

    #[test]
    fn test_alternating_roles() {
        let normalizer = MessageNormalizer::new(8);
        let result = normalizer.normalize(&payload("Current query", 6), None);

        let (query, history) = result.split_last().unwrap();
        assert_eq!(query.role, Role::User);
        for (i, msg) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Agent };
            assert_eq!(msg.role, expected);
        }
    }

    #[test]
    fn test_html_stripped_from_query_and_history() {
        let normalizer = MessageNormalizer::new(8);
        let raw = json!({
            "parts": [
                {"kind": "text", "text": "<p>Test <b>query</b></p>"},
                {"kind": "data", "data": [{"kind": "text", "text": "<p>History <br />item</p>"}]}
            ]
        });

        let result = normalizer.normalize(&raw, None);

        assert_eq!(texts(&result), vec!["History item", "Test query"]);
    }

    #[test]
    fn test_duplicates_dropped_first_occurrence_wins() {
        let normalizer = MessageNormalizer::new(8);
        let raw = json!({
            "parts": [
                {"kind": "text", "text": "Q"},
                {"kind": "data", "data": [
                    {"kind": "text", "text": "A"},
                    {"kind": "text", "text": "<b>B</b>"},
                    {"kind": "text", "text": "A"},
                    {"kind": "text", "text": "B"},
                    {"kind": "text", "text": "C"}
                ]}
            ]
        });

        let result = normalizer.normalize(&raw, None);
        assert_eq!(texts(&result), vec!["A", "B", "C", "Q"]);
    }

    #[test]
    fn test_query_only_taken_from_first_part() {
        let normalizer = MessageNormalizer::new(8);
        let raw = json!({
            "parts": [
                {"kind": "data", "data": [{"kind": "text", "text": "H0"}]},
                {"kind": "text", "text": "late query"}
            ]
        });

        let extracted = normalizer.extract(&raw, None);
        assert_eq!(extracted.query, None);
        assert_eq!(extracted.history, vec!["H0".to_string()]);
    }

    #[test]
    fn test_only_first_data_part_used() {
        let normalizer = MessageNormalizer::new(8);
        let raw = json!({
            "parts": [
                {"kind": "text", "text": "Q"},
                {"kind": "data", "data": {"not": "a list"}},
                {"kind": "data", "data": [{"kind": "text", "text": "first"}]},
                {"kind": "data", "data": [{"kind": "text", "text": "second"}]}
            ]
        });

        let result = normalizer.normalize(&raw, None);
        assert_eq!(texts(&result), vec!["first", "Q"]);
    }

    #[test]
    fn test_non_text_and_blank_items_skipped() {
        let normalizer = MessageNormalizer::new(8);
        let raw = json!({
            "parts": [
                {"kind": "text", "text": "Q"},
                {"kind": "data", "data": [
                    {"kind": "file", "file_url": "x"},
                    {"kind": "text", "text": ""},
                    {"kind": "text", "text": "<br/>"},
                    {"kind": "text"},
                    "garbage",
                    {"kind": "text", "text": "kept"}
                ]}
            ]
        });

        let result = normalizer.normalize(&raw, None);
        assert_eq!(texts(&result), vec!["kept", "Q"]);
    }

    #[test]
    fn test_blank_query_not_appended() {
        let normalizer = MessageNormalizer::new(8);
        let extracted = normalizer.extract(&payload("  <p> </p> ", 3), None);

        assert_eq!(extracted.query, None);
        assert_eq!(extracted.history.len(), 3);
        assert_eq!(extracted.clone().into_messages().len(), 3);
    }

    #[test]
    fn test_large_html_payload() {
        let normalizer = MessageNormalizer::new(8);
        let items: Vec<Value> = (0..50)
            .map(|i| {
                let text = format!("<p>History message {} with <b>HTML</b></p>", i);
                json!({"kind": "text", "text": text})
            })
            .collect();
        let raw = json!({"parts": [
            {"kind": "text", "text": "<p>Current study query</p>"},
            {"kind": "data", "data": items}
        ]});

        let result = normalizer.normalize(&raw, None);

        assert!(result.len() <= 8);
        assert_eq!(result.last().unwrap().first_text(), Some("Current study query"));
        for msg in &result {
            let text = msg.first_text().unwrap();
            assert!(!text.contains('<'), "markup left in {:?}", text);
        }
    }
}
