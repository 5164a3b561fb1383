//! Argument structs for ezBookkeeping MCP tool calls.
//!
//! Each struct derives [`serde::Serialize`] and maps one-to-one onto
//! the `arguments` object of the corresponding remote tool.

use serde::Serialize;

/// Arguments for the `add_transaction` tool.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AddTransactionArgs {
    /// Transaction type; the chat flow only records expenses.
    #[serde(rename = "type")]
    pub(crate) kind: String,
    /// UTC timestamp, `Z`-suffixed ISO-8601.
    pub(crate) time: String,
    /// Category name as configured in ezBookkeeping.
    pub(crate) category_name: String,
    /// Account name as configured in ezBookkeeping.
    pub(crate) account_name: String,
    /// Amount rendered as text.
    pub(crate) amount: String,
}

/// Optional filters for the `query_transactions` tool.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct QueryTransactionsArgs {
    /// Start time (inclusive), ISO-8601.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) start_time: Option<String>,
    /// End time (inclusive), ISO-8601.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) end_time: Option<String>,
    /// Filter by transaction type (`expense`, `income`, `transfer`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) kind: Option<String>,
    /// Filter by category name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) category_name: Option<String>,
    /// Filter by account name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) account_name: Option<String>,
    /// Maximum number of transactions to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) count: Option<u32>,
}

/// Arguments for the `query_latest_exchange_rates` tool.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExchangeRatesArgs {
    /// Comma-separated currency codes, e.g. `USD,EUR`.
    pub(crate) currencies: String,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use serde_json::json;

    use super::{AddTransactionArgs, ExchangeRatesArgs, QueryTransactionsArgs};

    #[test]
    fn add_transaction_wire_shape() {
        let args = AddTransactionArgs {
            kind: "expense".to_owned(),
            time: "2024-01-05T10:00:00Z".to_owned(),
            category_name: "Food".to_owned(),
            account_name: "Checking".to_owned(),
            amount: "20".to_owned(),
        };
        let value = serde_json::to_value(&args).expect("should serialize");
        assert_eq!(
            value,
            json!({
                "type": "expense",
                "time": "2024-01-05T10:00:00Z",
                "category_name": "Food",
                "account_name": "Checking",
                "amount": "20"
            })
        );
    }

    #[test]
    fn query_transactions_empty_filters() {
        let args = QueryTransactionsArgs::default();
        let value = serde_json::to_value(&args).expect("should serialize");
        assert_eq!(value, json!({}));
    }

    #[test]
    fn query_transactions_partial_filters() {
        let args = QueryTransactionsArgs {
            start_time: Some("2024-01-01T00:00:00Z".to_owned()),
            kind: Some("expense".to_owned()),
            count: Some(50),
            ..QueryTransactionsArgs::default()
        };
        let value = serde_json::to_value(&args).expect("should serialize");
        assert_eq!(
            value,
            json!({
                "start_time": "2024-01-01T00:00:00Z",
                "type": "expense",
                "count": 50
            })
        );
    }

    #[test]
    fn exchange_rates_args() {
        let args = ExchangeRatesArgs {
            currencies: "USD,EUR".to_owned(),
        };
        let value = serde_json::to_value(&args).expect("should serialize");
        assert_eq!(value, json!({"currencies": "USD,EUR"}));
    }
}
