//! Gateway adapter interface for the worker.
//!
//! A gateway receives one fully validated [`Operation`] at a time and either
//! answers with a [`GatewayReply`] (approved or declined) or rejects it with a
//! [`WorkerError`] (the processor refused to run the operation at all).

use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::bridge::protocol::{Action, Payload};

/// Problems that stop an operation before or during gateway execution.
/// The display text is sent back verbatim as the response message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{0}")]
    Gateway(String),
}

/// Outcome of an operation the gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatewayReply {
    pub success: bool,
    pub message: String,
    pub authorization: Option<String>,
    pub test: bool,
    pub fraud_review: bool,
}

/// Card details assembled from caller data.
#[derive(Clone, PartialEq, Eq)]
pub struct CreditCard {
    pub number: String,
    pub month: String,
    pub year: String,
    pub first_name: String,
    pub last_name: String,
    pub verification_value: String,
}

impl CreditCard {
    /// Build from caller data, requiring every card field.
    pub fn from_data(data: &Payload) -> Result<Self, WorkerError> {
        let number = required(data, "cc_number")?;
        let month = required(data, "cc_exp_month")?;
        let year = required(data, "cc_exp_year")?;
        let first_name = required(data, "bill_first_name")?;
        let last_name = required(data, "bill_last_name")?;
        let verification_value = required(data, "cc_ccv")?;

        Ok(Self {
            number: number.split_whitespace().collect(),
            month,
            year,
            first_name,
            last_name,
            verification_value,
        })
    }

    /// Masked number safe to show the customer.
    pub fn display_number(&self) -> String {
        let digits: Vec<char> = self.number.chars().collect();
        let start = digits.len().saturating_sub(4);
        let last: String = digits[start..].iter().collect();
        format!("XXXX-XXXX-XXXX-{}", last)
    }

    /// Card brand guessed from the number's prefix and length.
    pub fn brand(&self) -> Option<&'static str> {
        let n = self.number.as_str();
        if !n.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match (n.len(), n) {
            (1, "1" | "2" | "3") => Some("bogus"),
            (13 | 16, _) if n.starts_with('4') => Some("visa"),
            (16, _) if matches!(&n[..2], "51" | "52" | "53" | "54" | "55") => Some("master"),
            (15, _) if n.starts_with("34") || n.starts_with("37") => Some("american_express"),
            (16, _) if n.starts_with("6011") || n.starts_with("65") => Some("discover"),
            _ => None,
        }
    }
}

// Card numbers and CVVs never reach logs.
impl std::fmt::Debug for CreditCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditCard")
            .field("number", &self.display_number())
            .field("month", &self.month)
            .field("year", &self.year)
            .finish_non_exhaustive()
    }
}

/// One gateway call with its arguments already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Authorize { amount: i64, card: CreditCard },
    Capture { amount: i64, authorization: String },
    Purchase { amount: i64, card: CreditCard },
    Void { authorization: String },
    Refund { amount: i64, authorization: String },
    Store { card: CreditCard },
    Retrieve { authorization: String },
    Update { authorization: String, card: CreditCard },
    Unstore { authorization: String },
}

impl Operation {
    /// Check `action`'s required parameters and assemble the call.
    ///
    /// Presence is checked before format, in the order the parameters are
    /// listed, so the first problem reported is stable.
    pub fn prepare(action: Action, data: &Payload, secure_data: &Payload) -> Result<Self, WorkerError> {
        let operation = match action {
            Action::Authorize | Action::Purchase => {
                let amount = parse_amount(secure_data)?;
                let card = CreditCard::from_data(data)?;
                if action == Action::Authorize {
                    Operation::Authorize { amount, card }
                } else {
                    Operation::Purchase { amount, card }
                }
            }
            Action::Capture | Action::Refund => {
                required(secure_data, "amount")?;
                let authorization = required(secure_data, "authorization")?;
                let amount = parse_amount(secure_data)?;
                if action == Action::Capture {
                    Operation::Capture { amount, authorization }
                } else {
                    Operation::Refund { amount, authorization }
                }
            }
            Action::Void => Operation::Void {
                authorization: required(secure_data, "authorization")?,
            },
            Action::Retrieve => Operation::Retrieve {
                authorization: required(secure_data, "authorization")?,
            },
            Action::Unstore => Operation::Unstore {
                authorization: required(secure_data, "authorization")?,
            },
            Action::Store => Operation::Store {
                card: CreditCard::from_data(data)?,
            },
            Action::Update => {
                let authorization = required(secure_data, "authorization")?;
                let card = CreditCard::from_data(data)?;
                Operation::Update { authorization, card }
            }
        };
        Ok(operation)
    }

    pub fn action(&self) -> Action {
        match self {
            Operation::Authorize { .. } => Action::Authorize,
            Operation::Capture { .. } => Action::Capture,
            Operation::Purchase { .. } => Action::Purchase,
            Operation::Void { .. } => Action::Void,
            Operation::Refund { .. } => Action::Refund,
            Operation::Store { .. } => Action::Store,
            Operation::Retrieve { .. } => Action::Retrieve,
            Operation::Update { .. } => Action::Update,
            Operation::Unstore { .. } => Action::Unstore,
        }
    }

    pub fn amount(&self) -> Option<i64> {
        match self {
            Operation::Authorize { amount, .. }
            | Operation::Capture { amount, .. }
            | Operation::Purchase { amount, .. }
            | Operation::Refund { amount, .. } => Some(*amount),
            _ => None,
        }
    }

    pub fn card(&self) -> Option<&CreditCard> {
        match self {
            Operation::Authorize { card, .. }
            | Operation::Purchase { card, .. }
            | Operation::Store { card }
            | Operation::Update { card, .. } => Some(card),
            _ => None,
        }
    }
}

/// A payment processor adapter hosted by the worker.
pub trait Gateway: Send {
    /// Actions this gateway can run. Anything else is answered with
    /// "Unrecognized Action" without calling [`Gateway::execute`].
    fn supported_actions(&self) -> BTreeSet<Action>;

    /// Run `operation`. `options` carries caller-supplied extras such as
    /// billing and shipping addresses.
    fn execute(&mut self, operation: &Operation, options: &Payload) -> Result<GatewayReply, WorkerError>;
}

/// String value of `key`, treating null as absent.
pub fn required(map: &Payload, key: &str) -> Result<String, WorkerError> {
    match map.get(key) {
        None | Some(Value::Null) => Err(WorkerError::MissingParameter(key.to_string())),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
    }
}

/// Integer amount in minor units.
pub fn parse_amount(map: &Payload) -> Result<i64, WorkerError> {
    match map.get("amount") {
        None | Some(Value::Null) => Err(WorkerError::MissingParameter("amount".into())),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| WorkerError::InvalidAmount(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| WorkerError::InvalidAmount(s.clone())),
        Some(other) => Err(WorkerError::InvalidAmount(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card_data(number: &str) -> Payload {
        json!({
            "cc_number": number,
            "cc_exp_month": "12",
            "cc_exp_year": "2030",
            "bill_first_name": "Jane",
            "bill_last_name": "Doe",
            "cc_ccv": "123",
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_card_strips_whitespace() {
        let card = CreditCard::from_data(&card_data("4111 1111\t1111 1111")).unwrap();
        assert_eq!(card.number, "4111111111111111");
        assert_eq!(card.display_number(), "XXXX-XXXX-XXXX-1111");
        assert_eq!(card.brand(), Some("visa"));
    }

    #[test]
    fn test_card_requires_fields_in_order() {
        let mut data = card_data("1");
        data.remove("cc_exp_year");
        data.remove("cc_ccv");
        assert_eq!(
            CreditCard::from_data(&data).unwrap_err().to_string(),
            "Missing required parameter: cc_exp_year"
        );
    }

    #[test]
    fn test_debug_masks_number() {
        let card = CreditCard::from_data(&card_data("4111111111111111")).unwrap();
        let debug = format!("{:?}", card);
        assert!(!debug.contains("4111111111111111"));
        assert!(!debug.contains("123"));
    }

    #[test]
    fn test_brand_detection() {
        let brand = |n: &str| CreditCard::from_data(&card_data(n)).unwrap().brand();
        assert_eq!(brand("1"), Some("bogus"));
        assert_eq!(brand("5500000000000004"), Some("master"));
        assert_eq!(brand("340000000000009"), Some("american_express"));
        assert_eq!(brand("6011000000000004"), Some("discover"));
        assert_eq!(brand("9999"), None);
    }

    #[test]
    fn test_prepare_checks_presence_before_format() {
        let secure = json!({"amount": "ten"}).as_object().unwrap().clone();
        let err = Operation::prepare(Action::Capture, &Payload::new(), &secure).unwrap_err();
        assert_eq!(err, WorkerError::MissingParameter("authorization".into()));

        let err = Operation::prepare(Action::Authorize, &card_data("1"), &secure).unwrap_err();
        assert_eq!(err.to_string(), "Invalid amount: ten");
    }

    #[test]
    fn test_prepare_builds_operation() {
        let secure = json!({"amount": "100", "authorization": "abc"}).as_object().unwrap().clone();
        let refund = Operation::prepare(Action::Refund, &Payload::new(), &secure).unwrap();
        assert_eq!(
            refund,
            Operation::Refund { amount: 100, authorization: "abc".into() }
        );
        assert_eq!(refund.action(), Action::Refund);
        assert_eq!(refund.amount(), Some(100));
        assert!(refund.card().is_none());

        let update = Operation::prepare(Action::Update, &card_data("1"), &secure).unwrap();
        assert_eq!(update.card().map(|c| c.number.as_str()), Some("1"));
        assert_eq!(update.amount(), None);
    }

    #[test]
    fn test_parse_amount() {
        let amount = |v: Value| parse_amount(json!({ "amount": v }).as_object().unwrap());
        assert_eq!(amount(json!("100")), Ok(100));
        assert_eq!(amount(json!(250)), Ok(250));
        assert_eq!(amount(json!("$50")), Err(WorkerError::InvalidAmount("$50".into())));
        assert_eq!(amount(json!(1.5)), Err(WorkerError::InvalidAmount("1.5".into())));
        assert_eq!(
            parse_amount(&Payload::new()).unwrap_err().to_string(),
            "Missing required parameter: amount"
        );
    }
}
