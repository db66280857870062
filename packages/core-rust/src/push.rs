//! Payload of the real-time push channel.
//!
//! Wire names follow the backend's transaction event (`transactionId`,
//! `sourceAccountId`, ...); the generic names are accepted as aliases.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// A server push announcing that an operation touched the user's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    #[serde(rename = "transactionId", alias = "operationId")]
    pub operation_id: String,
    pub user_id: String,
    #[serde(
        rename = "sourceAccountId",
        alias = "sourceId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_id: Option<String>,
    #[serde(
        rename = "destinationAccountId",
        alias = "destinationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub destination_id: Option<String>,
    #[serde(
        rename = "type",
        alias = "kind",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_code: Option<String>,
}

impl PushMessage {
    /// Parses a JSON message body.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for non-JSON bodies or bodies missing
    /// `transactionId`/`userId`.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// User-facing text for the info notification raised by this push.
    #[must_use]
    pub fn summary(&self) -> String {
        let kind = self
            .kind
            .as_deref()
            .filter(|k| !k.is_empty())
            .map_or_else(|| "TRANSACTION".to_string(), str::to_uppercase);
        let mut text = format!("New transaction: {kind}");

        let amount = non_empty(self.amount.as_deref());
        let asset = non_empty(self.asset_code.as_deref());
        if let (Some(amount), Some(asset)) = (amount, asset) {
            text.push_str(&format!(" - {amount} {asset}"));
        }

        match self.kind.as_deref() {
            Some("transfer") => text.push_str(" (Transfer completed)"),
            Some("deposit") => text.push_str(" (Deposit received)"),
            Some("withdrawal") => text.push_str(" (Withdrawal processed)"),
            _ => {}
        }
        text
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Accepts `"12.50"`, `12.5` or `null` for an optional amount.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string, a number or null")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(self)
        }
    }

    deserializer.deserialize_any(AmountVisitor)
}
