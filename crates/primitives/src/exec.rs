//! Execution results as reported by a node's application log.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::hash::{Hash160, Hash256};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("malformed application log: {0}")]
    Json(#[from] serde_json::Error),

    #[error("application log has no Application trigger execution")]
    MissingExecution,

    #[error("unsupported stack item type '{0}'")]
    UnknownItemType(String),

    #[error("invalid value for {kind} stack item")]
    InvalidValue { kind: &'static str },

    #[error("invalid integer '{0}'")]
    Integer(String),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Final state of the virtual machine after running a transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VmState {
    Halt,
    Fault,
}

/// A value left on the result stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackItem {
    Any,
    Boolean(bool),
    Integer(i64),
    ByteString(Vec<u8>),
    Buffer(Vec<u8>),
    Array(Vec<StackItem>),
    Struct(Vec<StackItem>),
    Map(Vec<(StackItem, StackItem)>),
    InteropInterface,
}

impl StackItem {
    /// Parses the `{"type": .., "value": ..}` JSON form.
    pub fn from_json(value: &Value) -> Result<Self, ExecError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ExecError::InvalidValue { kind: "untyped" })?;
        let inner = value.get("value").unwrap_or(&Value::Null);

        let item = match kind {
            "Any" => StackItem::Any,
            "InteropInterface" => StackItem::InteropInterface,
            "Boolean" => StackItem::Boolean(
                inner
                    .as_bool()
                    .ok_or(ExecError::InvalidValue { kind: "Boolean" })?,
            ),
            "Integer" => StackItem::Integer(parse_integer(inner)?),
            "ByteString" => StackItem::ByteString(parse_base64(inner, "ByteString")?),
            "Buffer" => StackItem::Buffer(parse_base64(inner, "Buffer")?),
            "Array" => StackItem::Array(parse_items(inner, "Array")?),
            "Struct" => StackItem::Struct(parse_items(inner, "Struct")?),
            "Map" => {
                let entries = inner
                    .as_array()
                    .ok_or(ExecError::InvalidValue { kind: "Map" })?;
                let mut pairs = Vec::with_capacity(entries.len());
                for entry in entries {
                    let key = entry
                        .get("key")
                        .ok_or(ExecError::InvalidValue { kind: "Map" })?;
                    let val = entry
                        .get("value")
                        .ok_or(ExecError::InvalidValue { kind: "Map" })?;
                    pairs.push((Self::from_json(key)?, Self::from_json(val)?));
                }
                StackItem::Map(pairs)
            }
            other => return Err(ExecError::UnknownItemType(other.to_owned())),
        };
        Ok(item)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            StackItem::Integer(v) => Some(*v),
            StackItem::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            StackItem::ByteString(b) | StackItem::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Reads a 20-byte string item as a script hash.
    pub fn as_hash160(&self) -> Option<Hash160> {
        self.as_bytes()
            .and_then(|b| Hash160::from_be_slice(b).ok())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Any)
    }
}

impl<'de> Deserialize<'de> for StackItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        StackItem::from_json(&value).map_err(D::Error::custom)
    }
}

fn parse_integer(value: &Value) -> Result<i64, ExecError> {
    match value {
        Value::String(s) => s.parse().map_err(|_| ExecError::Integer(s.clone())),
        Value::Number(n) => n.as_i64().ok_or_else(|| ExecError::Integer(n.to_string())),
        _ => Err(ExecError::InvalidValue { kind: "Integer" }),
    }
}

fn parse_base64(value: &Value, kind: &'static str) -> Result<Vec<u8>, ExecError> {
    let encoded = value.as_str().ok_or(ExecError::InvalidValue { kind })?;
    Ok(STANDARD.decode(encoded)?)
}

fn parse_items(value: &Value, kind: &'static str) -> Result<Vec<StackItem>, ExecError> {
    value
        .as_array()
        .ok_or(ExecError::InvalidValue { kind })?
        .iter()
        .map(StackItem::from_json)
        .collect()
}

/// Event emitted by a contract during execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub contract: Hash160,
    pub event_name: String,
    pub state: StackItem,
}

/// Outcome of executing one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub tx_hash: Hash256,
    pub vm_state: VmState,
    /// Fault message, present when `vm_state` is `Fault`.
    pub exception: Option<String>,
    pub gas_consumed: i64,
    pub stack: Vec<StackItem>,
    pub notifications: Vec<Notification>,
}

/// `getapplicationlog` response for one transaction.
#[derive(Clone, Debug, Deserialize)]
pub struct ApplicationLog {
    txid: Hash256,
    executions: Vec<RawExecution>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawExecution {
    trigger: String,
    vmstate: VmState,
    #[serde(default)]
    exception: Option<String>,
    gasconsumed: String,
    #[serde(default)]
    stack: Vec<StackItem>,
    #[serde(default)]
    notifications: Vec<RawNotification>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawNotification {
    contract: Hash160,
    eventname: String,
    state: StackItem,
}

impl ApplicationLog {
    pub fn tx_hash(&self) -> Hash256 {
        self.txid
    }

    /// Keeps the `Application` trigger execution.
    pub fn into_result(self) -> Result<ExecutionResult, ExecError> {
        let exec = self
            .executions
            .into_iter()
            .find(|e| e.trigger == "Application")
            .ok_or(ExecError::MissingExecution)?;

        let gas_consumed = exec
            .gasconsumed
            .parse()
            .map_err(|_| ExecError::Integer(exec.gasconsumed.clone()))?;

        Ok(ExecutionResult {
            tx_hash: self.txid,
            vm_state: exec.vmstate,
            exception: exec.exception,
            gas_consumed,
            stack: exec.stack,
            notifications: exec
                .notifications
                .into_iter()
                .map(|n| Notification {
                    contract: n.contract,
                    event_name: n.eventname,
                    state: n.state,
                })
                .collect(),
        })
    }
}

impl ExecutionResult {
    /// Parses a `getapplicationlog` response body.
    pub fn from_application_log(json: &str) -> Result<Self, ExecError> {
        serde_json::from_str::<ApplicationLog>(json)?.into_result()
    }

    pub fn is_halt(&self) -> bool {
        self.vm_state == VmState::Halt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_LOG: &str = r#"{
        "txid": "0x8f1a6ab3ed3e4c1b0b0f11a0d2e4e2dfe7ad4b9fe9e0d6e5a5f3fe0a1b2c3d4e",
        "executions": [{
            "trigger": "Application",
            "vmstate": "HALT",
            "exception": null,
            "gasconsumed": "2007570",
            "stack": [
                {"type": "ByteString", "value": "r/oQ8aub4rlyLPo5xipf3i4zwSk="},
                {"type": "Integer", "value": "100"},
                {"type": "Array", "value": [{"type": "Boolean", "value": true}, {"type": "Any"}]}
            ],
            "notifications": [{
                "contract": "0x29c1332ede5f2ac639fa2c72b9e29babf110faaf",
                "eventname": "Bet",
                "state": {"type": "Array", "value": [{"type": "Integer", "value": "5"}]}
            }]
        }]
    }"#;

    #[test]
    fn test_parses_application_log() {
        let result = ExecutionResult::from_application_log(APP_LOG).unwrap();
        assert!(result.is_halt());
        assert_eq!(result.gas_consumed, 2_007_570);
        assert_eq!(result.exception, None);
        assert_eq!(result.stack.len(), 3);

        let winner = result.stack[0].as_hash160().unwrap();
        assert_eq!(winner.to_le_hex(), "29c1332ede5f2ac639fa2c72b9e29babf110faaf");
        assert_eq!(result.stack[1].as_integer(), Some(100));
        assert_eq!(
            result.stack[2],
            StackItem::Array(vec![StackItem::Boolean(true), StackItem::Any])
        );

        assert_eq!(result.notifications.len(), 1);
        assert_eq!(result.notifications[0].event_name, "Bet");
    }

    #[test]
    fn test_fault_keeps_exception() {
        let json = r#"{
            "txid": "0x0000000000000000000000000000000000000000000000000000000000000000",
            "executions": [{
                "trigger": "Application",
                "vmstate": "FAULT",
                "exception": "bet is too low",
                "gasconsumed": "0",
                "stack": []
            }]
        }"#;
        let result = ExecutionResult::from_application_log(json).unwrap();
        assert_eq!(result.vm_state, VmState::Fault);
        assert_eq!(result.exception.as_deref(), Some("bet is too low"));
    }

    #[test]
    fn test_missing_application_trigger() {
        let json = r#"{
            "txid": "0x0000000000000000000000000000000000000000000000000000000000000000",
            "executions": [{"trigger": "Verification", "vmstate": "HALT", "gasconsumed": "0"}]
        }"#;
        assert!(matches!(
            ExecutionResult::from_application_log(json),
            Err(ExecError::MissingExecution)
        ));
    }

    #[test]
    fn test_rejects_unknown_item_type() {
        let value: Value = serde_json::from_str(r#"{"type": "Pointer", "value": 3}"#).unwrap();
        assert!(matches!(
            StackItem::from_json(&value),
            Err(ExecError::UnknownItemType(t)) if t == "Pointer"
        ));
    }
}
