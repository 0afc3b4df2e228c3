//! Worker request loop.
//!
//! # Responsibilities
//! - Build the gateway registry from the JSON list in the environment
//! - Answer every input line with exactly one output line
//! - Turn gateway outcomes into flat response objects
//!
//! # Data Flow
//! ```text
//! stdin line → Request → gateway lookup → Operation::prepare
//!     → Gateway::execute → Outcome → Response → stdout line
//! ```

use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use crate::bridge::protocol::{Action, GatewayConfig, Payload, Request, Response};
use crate::worker::bogus::BogusGateway;
use crate::worker::gateway::{CreditCard, Gateway, GatewayReply, Operation};

const ADDRESS_FIELDS: [&str; 9] = [
    "first_name",
    "last_name",
    "address1",
    "address2",
    "city",
    "state",
    "country",
    "zip",
    "email",
];

// Keys the response owns; passthrough may not overwrite them.
const RESERVED_FIELDS: [&str; 6] = [
    "request_id",
    "success",
    "message",
    "supported_actions",
    "gateway",
    "action",
];

/// Instantiate the adapter for `config.module`, if this worker has one.
pub fn build_gateway(config: &GatewayConfig) -> Option<Box<dyn Gateway>> {
    match config.module.as_str() {
        "bogus" => Some(Box::new(BogusGateway)),
        _ => None,
    }
}

/// Gateway registry plus the request/response loop.
#[derive(Default)]
pub struct WorkerRuntime {
    // `None` marks a configured gateway whose module is unknown.
    gateways: HashMap<String, Option<Box<dyn Gateway>>>,
}

impl WorkerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for `configs`. Unknown modules stay registered but unusable.
    pub fn configure(configs: &[GatewayConfig]) -> Self {
        let mut runtime = Self::new();
        for config in configs {
            let gateway = build_gateway(config);
            if gateway.is_none() {
                tracing::warn!(gateway = %config.name, module = %config.module, "Unknown gateway module");
            }
            runtime.gateways.insert(config.name.clone(), gateway);
        }
        runtime
    }

    /// Read the gateway list from environment variable `var`.
    /// An unset variable yields an empty registry.
    pub fn from_env(var: &str) -> Result<Self, serde_json::Error> {
        match std::env::var(var) {
            Ok(raw) => {
                let configs: Vec<GatewayConfig> = serde_json::from_str(&raw)?;
                Ok(Self::configure(&configs))
            }
            Err(_) => {
                tracing::warn!(var, "Gateway configuration variable not set");
                Ok(Self::new())
            }
        }
    }

    /// Add or replace a gateway under `name`.
    pub fn register(&mut self, name: impl Into<String>, gateway: Box<dyn Gateway>) {
        self.gateways.insert(name.into(), Some(gateway));
    }

    pub fn gateway_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.gateways.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Answer one request.
    pub fn handle(&mut self, request: Request) -> Response {
        let Request {
            request_id,
            data,
            secure_data,
            gateway: name,
            action,
        } = request;

        let mut response = match (self.gateways.get_mut(&name), action.as_deref()) {
            (None | Some(None), _) => Response::failure("Unrecognized gateway"),
            (Some(Some(gateway)), None) => Response {
                supported_actions: Some(
                    gateway
                        .supported_actions()
                        .into_iter()
                        .map(|a| a.as_str().to_string())
                        .collect(),
                ),
                ..Response::failure("No action")
            },
            (Some(Some(_)), Some(_)) if data.is_none() => Response::failure("No Data"),
            (Some(Some(gateway)), Some(action)) => process(
                gateway.as_mut(),
                action,
                &data.unwrap_or_default(),
                &secure_data.unwrap_or_default(),
            ),
        };

        tracing::debug!(
            request_id,
            gateway = %name,
            action = action.as_deref().unwrap_or("-"),
            success = response.success,
            "Handled request"
        );

        response.request_id = request_id;
        response.fields.insert("gateway".into(), Value::String(name));
        response.fields.insert("action".into(), json!(action));
        response
    }

    /// Answer one raw input line. Unparseable lines still get a reply so the
    /// caller's one-line-per-request framing holds.
    pub fn handle_line(&mut self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line.trim_end_matches(&['\r', '\n'][..])) {
            Ok(request) => self.handle(request),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed request line");
                Response::failure("Malformed request")
            }
        }
    }

    /// Serve requests from `input` until EOF. Returns the number handled.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> io::Result<u64> {
        let mut handled = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let response = self.handle_line(&line);

            serde_json::to_writer(&mut output, &response)?;
            output.write_all(b"\n")?;
            output.flush()?;
            handled += 1;
        }
        tracing::info!(handled, "Input closed, worker exiting");
        Ok(handled)
    }
}

impl std::fmt::Debug for WorkerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRuntime")
            .field("gateways", &self.gateway_names())
            .finish()
    }
}

/// Everything gathered while running one action.
#[derive(Default)]
struct Outcome {
    passthrough: Payload,
    reply: Option<GatewayReply>,
    error: Option<String>,
    card: Option<CreditCard>,
    amount: Option<i64>,
    currency_code: Option<Value>,
    bill_address: Option<Payload>,
    ship_address: Option<Payload>,
}

impl Outcome {
    fn into_response(self) -> Response {
        let mut fields = self.passthrough;

        let (success, mut message) = match self.reply {
            Some(reply) => {
                fields.insert("test".into(), Value::Bool(reply.test));
                fields.insert("fraud_review".into(), Value::Bool(reply.fraud_review));
                fields.insert("authorization".into(), json!(reply.authorization));
                (reply.success, reply.message)
            }
            None => (false, String::new()),
        };
        if let Some(error) = self.error {
            message = error;
        }

        for (prefix, address) in [("bill", self.bill_address), ("ship", self.ship_address)] {
            for (key, value) in address.into_iter().flatten() {
                fields.insert(format!("{}_{}", prefix, key), value);
            }
        }

        if let Some(card) = self.card {
            fields.insert("cc_display".into(), Value::String(card.display_number()));
            fields.insert("cc_exp_month".into(), numeric_or_string(&card.month));
            fields.insert("cc_exp_year".into(), numeric_or_string(&card.year));
            fields.insert("cc_type".into(), json!(card.brand()));
        }
        if let Some(amount) = self.amount {
            fields.insert("amount".into(), json!(amount));
        }
        if let Some(currency_code) = self.currency_code {
            fields.insert("currency_code".into(), currency_code);
        }

        Response {
            request_id: 0,
            success,
            message,
            supported_actions: None,
            fields,
        }
    }
}

fn process(gateway: &mut dyn Gateway, action: &str, data: &Payload, secure_data: &Payload) -> Response {
    let mut outcome = Outcome {
        passthrough: passthrough(data, secure_data),
        ..Outcome::default()
    };

    let action = match action.parse::<Action>() {
        Ok(action) if gateway.supported_actions().contains(&action) => action,
        _ => {
            outcome.error = Some("Unrecognized Action".into());
            return outcome.into_response();
        }
    };

    let operation = match Operation::prepare(action, data, secure_data) {
        Ok(operation) => operation,
        Err(e) => {
            outcome.error = Some(e.to_string());
            return outcome.into_response();
        }
    };

    let options = build_options(data, secure_data);
    outcome.bill_address = parse_address(data, "bill");
    outcome.ship_address = parse_address(data, "ship");
    outcome.amount = operation.amount();
    outcome.card = operation.card().cloned();
    outcome.currency_code = secure_data.get("currency_code").cloned();

    match gateway.execute(&operation, &options) {
        Ok(reply) => outcome.reply = Some(reply),
        Err(e) => outcome.error = Some(e.to_string()),
    }
    outcome.into_response()
}

/// Caller fields listed in `secure_data.passthrough` and echoed back.
/// Card fields are never echoed.
fn passthrough(data: &Payload, secure_data: &Payload) -> Payload {
    let keys = match secure_data.get("passthrough") {
        Some(Value::Array(keys)) => keys,
        _ => return Payload::new(),
    };
    keys.iter()
        .filter_map(Value::as_str)
        .filter(|key| !key.starts_with("cc_") && !RESERVED_FIELDS.contains(key))
        .filter_map(|key| data.get(key).map(|value| (key.to_string(), value.clone())))
        .collect()
}

/// Address with `prefix`, or `None` when the caller sent none of its fields.
fn parse_address(data: &Payload, prefix: &str) -> Option<Payload> {
    let mut found = false;
    let address: Payload = ADDRESS_FIELDS
        .iter()
        .map(|field| {
            let value = data.get(&format!("{}_{}", prefix, field)).cloned();
            found |= value.is_some();
            (field.to_string(), value.unwrap_or(Value::Null))
        })
        .collect();
    found.then_some(address)
}

fn build_options(data: &Payload, secure_data: &Payload) -> Payload {
    let mut options = match secure_data.get("options") {
        Some(Value::Object(options)) => options.clone(),
        _ => Payload::new(),
    };
    if let Some(address) = parse_address(data, "bill") {
        options.insert("address".into(), Value::Object(address));
    }
    if let Some(address) = parse_address(data, "ship") {
        options.insert("ship_address".into(), Value::Object(address));
    }
    options
}

fn numeric_or_string(raw: &str) -> Value {
    raw.trim()
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::bogus::{AUTHORIZATION, ERROR_MESSAGE, SUCCESS_MESSAGE};
    use std::io::Cursor;

    fn runtime() -> WorkerRuntime {
        WorkerRuntime::configure(&[
            GatewayConfig::new("bogus", "test"),
            GatewayConfig::new("no_such_module", "broken"),
        ])
    }

    fn object(value: Value) -> Payload {
        value.as_object().unwrap().clone()
    }

    fn card_data(number: &str) -> Payload {
        object(json!({
            "cc_number": number,
            "cc_exp_month": "12",
            "cc_exp_year": "2030",
            "bill_first_name": "Jane",
            "bill_last_name": "Doe",
            "bill_zip": "94107",
            "cc_ccv": "123",
            "order_id": "A-17",
        }))
    }

    fn request(data: Option<Payload>, secure: Option<Payload>, gateway: &str, action: Option<&str>) -> Request {
        Request {
            request_id: 42,
            data,
            secure_data: secure,
            gateway: gateway.into(),
            action: action.map(str::to_string),
        }
    }

    #[test]
    fn test_unknown_and_unavailable_gateways() {
        let mut rt = runtime();
        for name in ["missing", "broken"] {
            let response = rt.handle(request(Some(Payload::new()), None, name, Some("void")));
            assert!(!response.success);
            assert_eq!(response.message, "Unrecognized gateway");
            assert_eq!(response.request_id, 42);
            assert_eq!(response.field_str("gateway"), Some(name));
        }
    }

    #[test]
    fn test_discovery() {
        let response = runtime().handle(request(None, None, "test", None));
        assert_eq!(response.message, "No action");
        assert!(!response.success);
        let actions = response.supported_actions.as_ref().unwrap();
        assert_eq!(actions.len(), 8);
        assert!(!actions.contains("retrieve"));
        assert_eq!(response.field("action"), Some(&Value::Null));
    }

    #[test]
    fn test_no_data_and_unrecognized_action() {
        let mut rt = runtime();
        let response = rt.handle(request(None, None, "test", Some("void")));
        assert_eq!(response.message, "No Data");

        for action in ["retrieve", "charge"] {
            let response = rt.handle(request(Some(Payload::new()), None, "test", Some(action)));
            assert_eq!(response.message, "Unrecognized Action");
            assert!(!response.success);
        }
    }

    #[test]
    fn test_authorize_reply_fields() {
        let secure = object(json!({"amount": "100", "currency_code": "USD", "passthrough": ["order_id", "cc_number"]}));
        let response = runtime().handle(request(Some(card_data("1")), Some(secure), "test", Some("authorize")));

        assert!(response.success);
        assert_eq!(response.message, SUCCESS_MESSAGE);
        assert_eq!(response.field_str("authorization"), Some(AUTHORIZATION));
        assert_eq!(response.field("test"), Some(&json!(true)));
        assert_eq!(response.field("amount"), Some(&json!(100)));
        assert_eq!(response.field_str("currency_code"), Some("USD"));
        assert_eq!(response.field_str("cc_display"), Some("XXXX-XXXX-XXXX-1"));
        assert_eq!(response.field("cc_exp_month"), Some(&json!(12)));
        assert_eq!(response.field_str("bill_zip"), Some("94107"));
        assert_eq!(response.field("bill_city"), Some(&Value::Null));
        assert!(response.field("ship_zip").is_none());
        assert_eq!(response.field_str("order_id"), Some("A-17"));
        assert!(response.field("cc_number").is_none());
        assert!(response.field("cc_ccv").is_none());
    }

    #[test]
    fn test_requirement_failure_omits_card_fields() {
        let secure = object(json!({"passthrough": ["order_id"]}));
        let response = runtime().handle(request(Some(card_data("1")), Some(secure), "test", Some("authorize")));
        assert!(!response.success);
        assert_eq!(response.message, "Missing required parameter: amount");
        assert!(response.field("cc_display").is_none());
        assert_eq!(response.field_str("order_id"), Some("A-17"));
    }

    #[test]
    fn test_gateway_error_keeps_card_fields() {
        let secure = object(json!({"amount": "100"}));
        let response = runtime().handle(request(
            Some(card_data("4111111111111111")),
            Some(secure),
            "test",
            Some("purchase"),
        ));
        assert!(!response.success);
        assert_eq!(response.message, ERROR_MESSAGE);
        assert_eq!(response.field_str("cc_type"), Some("visa"));
        assert!(response.field("authorization").is_none());
    }

    #[test]
    fn test_passthrough_cannot_override_reserved_fields() {
        let mut data = Payload::new();
        data.insert("message".into(), json!("spoofed"));
        let secure = object(json!({"authorization": "3", "passthrough": ["message"]}));
        let response = runtime().handle(request(Some(data), Some(secure), "test", Some("void")));
        assert!(response.success);
        assert_eq!(response.message, SUCCESS_MESSAGE);
        assert!(!serde_json::to_string(&response).unwrap().contains("spoofed"));
    }

    #[test]
    fn test_run_answers_every_line() {
        let input = concat!(
            r#"{"request_id": 1, "data": null, "secure_data": null, "gateway": "test", "action": null}"#,
            "\n",
            "this is not json\n",
            r#"{"request_id": 3, "data": {}, "secure_data": {"authorization": "1"}, "gateway": "test", "action": "unstore"}"#,
            "\n",
        );
        let mut output = Vec::new();
        let handled = runtime().run(Cursor::new(input), &mut output).unwrap();
        assert_eq!(handled, 3);

        let lines: Vec<Response> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].request_id, 1);
        assert!(lines[0].supported_actions.is_some());
        assert_eq!(lines[1].request_id, 0);
        assert_eq!(lines[1].message, "Malformed request");
        assert_eq!(lines[2].request_id, 3);
        assert!(lines[2].success);
    }
}
