//! Best-effort extraction of a transaction record from reply text.
//!
//! The assistant is told to answer with a bare JSON object, but replies
//! may still wrap it in prose. The scan takes the first `{` through the
//! last `}` and attempts a strict parse; anything else means "no
//! transaction". With several JSON blocks in one reply the greedy span
//! covers all of them and the parse fails, which also means "no
//! transaction".

use serde::Deserialize;
use serde_json::Value;

/// Structured transaction pulled out of free-form reply text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct TransactionRecord {
    /// Transaction timestamp, ISO-8601 (a bare date is accepted).
    pub(crate) date: String,
    /// Amount as the model produced it, JSON number or string.
    pub(crate) amount: Value,
    /// Account name.
    pub(crate) account: String,
    /// Category name.
    pub(crate) category: String,
}

impl TransactionRecord {
    /// Renders the amount the way the bookkeeping service expects it:
    /// strings pass through unchanged, numbers are formatted as text.
    pub(crate) fn amount_text(&self) -> String {
        self.amount
            .as_str()
            .map_or_else(|| self.amount.to_string(), str::to_owned)
    }
}

/// Scans `text` for a brace-delimited block and parses it as a
/// [`TransactionRecord`].
///
/// Returns `None` when there are no braces, the block is not valid
/// JSON, or the JSON is not a transaction record.
pub(crate) fn extract_transaction(text: &str) -> Option<TransactionRecord> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    let block = text.get(start..=end)?;
    serde_json::from_str(block).ok()
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use serde_json::json;

    use super::extract_transaction;

    #[test]
    fn bare_json_object() {
        let reply = r#"{"date":"2024-01-05","amount":20,"account":"Checking","category":"Food"}"#;
        let record = extract_transaction(reply).expect("should extract record");
        assert_eq!(record.date, "2024-01-05");
        assert_eq!(record.amount, json!(20));
        assert_eq!(record.account, "Checking");
        assert_eq!(record.category, "Food");
    }

    #[test]
    fn json_wrapped_in_prose() {
        let reply = concat!(
            "Recorded it for you:\n",
            r#"{"date":"2024-01-05T10:00:00","amount":"12.50","account":"Cash","category":"Coffee"}"#,
            "\nAnything else?"
        );
        let record = extract_transaction(reply).expect("should extract record");
        assert_eq!(record.account, "Cash");
        assert_eq!(record.amount_text(), "12.50");
    }

    #[test]
    fn no_braces_is_none() {
        assert!(extract_transaction("no transaction here").is_none());
    }

    #[test]
    fn malformed_json_is_none() {
        assert!(extract_transaction("{not json at all}").is_none());
    }

    #[test]
    fn non_transaction_object_is_none() {
        assert!(extract_transaction(r#"{"status": "ok"}"#).is_none());
    }

    #[test]
    fn multiple_blocks_greedy_span_is_none() {
        // First `{` to last `}` covers both objects; not valid JSON.
        let reply = concat!(
            r#"{"date":"2024-01-05","amount":1,"account":"A","category":"B"}"#,
            " and ",
            r#"{"date":"2024-01-06","amount":2,"account":"A","category":"B"}"#
        );
        assert!(extract_transaction(reply).is_none());
    }

    #[test]
    fn extra_keys_tolerated() {
        let reply = r#"{"date":"2024-01-05","amount":20,"account":"Checking","category":"Food","note":"espresso"}"#;
        assert!(extract_transaction(reply).is_some());
    }

    #[test]
    fn numeric_amount_renders_without_quotes() {
        let reply = r#"{"date":"2024-01-05","amount":20.5,"account":"Checking","category":"Food"}"#;
        let record = extract_transaction(reply).expect("should extract record");
        assert_eq!(record.amount_text(), "20.5");
    }
}
