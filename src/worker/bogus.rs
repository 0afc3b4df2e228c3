//! The `bogus` test gateway.
//!
//! Outcomes are forced by the card number or the authorization reference so
//! every path through the bridge can be exercised without a processor.
//!
//! | operation                 | `1`       | `2`     | anything else |
//! |---------------------------|-----------|---------|---------------|
//! | authorize, purchase, store, update (card) | success | decline | error |
//! | capture, void, refund (reference)         | error   | decline | success |
//! | unstore (reference)       | success   | decline | error         |

use std::collections::BTreeSet;

use crate::bridge::protocol::{Action, Payload};
use crate::worker::gateway::{Gateway, GatewayReply, Operation, WorkerError};

pub const AUTHORIZATION: &str = "53433";
pub const SUCCESS_MESSAGE: &str = "Bogus Gateway: Forced success";
pub const FAILURE_MESSAGE: &str = "Bogus Gateway: Forced failure";
pub const ERROR_MESSAGE: &str =
    "Bogus Gateway: Use CreditCard number 1 for success, 2 for exception and anything else for error";
pub const REFERENCE_ERROR_MESSAGE: &str =
    "Bogus Gateway: Use authorization number 1 for exception, 2 for error and anything else for success";
pub const UNSTORE_ERROR_MESSAGE: &str =
    "Bogus Gateway: Use trans_id 1 for success, 2 for exception and anything else for error";

/// Stored-card identifier handed out by `store`.
const STORED_CARD_ID: &str = "1";

/// Takes no parameters; any configured ones are ignored.
#[derive(Debug, Default)]
pub struct BogusGateway;

impl Gateway for BogusGateway {
    fn supported_actions(&self) -> BTreeSet<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| *action != Action::Retrieve)
            .collect()
    }

    fn execute(&mut self, operation: &Operation, _options: &Payload) -> Result<GatewayReply, WorkerError> {
        match operation {
            Operation::Authorize { card, .. } | Operation::Purchase { card, .. } => {
                by_card(&card.number, AUTHORIZATION)
            }
            Operation::Store { card } | Operation::Update { card, .. } => {
                by_card(&card.number, STORED_CARD_ID)
            }
            Operation::Capture { authorization, .. }
            | Operation::Void { authorization }
            | Operation::Refund { authorization, .. } => match authorization.as_str() {
                "1" => Err(WorkerError::Gateway(REFERENCE_ERROR_MESSAGE.into())),
                "2" => Ok(failure()),
                _ => Ok(success(None)),
            },
            Operation::Unstore { authorization } => match authorization.as_str() {
                "1" => Ok(success(None)),
                "2" => Ok(failure()),
                _ => Err(WorkerError::Gateway(UNSTORE_ERROR_MESSAGE.into())),
            },
            Operation::Retrieve { .. } => Err(WorkerError::Gateway("Unrecognized Action".into())),
        }
    }
}

fn by_card(number: &str, authorization: &str) -> Result<GatewayReply, WorkerError> {
    match number {
        "1" => Ok(success(Some(authorization))),
        "2" => Ok(failure()),
        _ => Err(WorkerError::Gateway(ERROR_MESSAGE.into())),
    }
}

fn success(authorization: Option<&str>) -> GatewayReply {
    GatewayReply {
        success: true,
        message: SUCCESS_MESSAGE.into(),
        authorization: authorization.map(str::to_string),
        test: true,
        fraud_review: false,
    }
}

fn failure() -> GatewayReply {
    GatewayReply {
        success: false,
        message: FAILURE_MESSAGE.into(),
        authorization: None,
        test: true,
        fraud_review: false,
    }
}
