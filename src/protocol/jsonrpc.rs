//! JSON-RPC codec
//!
//! Validates request objects in the order the error table below implies and
//! answers with JSON-RPC 2.0 envelopes. Error objects carry the
//! `"JSONRPCError"` name and the numeric codes of the 1.x working draft.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::{EncodeError, InvokeError, ProcedureError};
use crate::protocol::Fault;
use crate::value::RpcValue;

pub const SERVER_ERROR: i64 = 100;
pub const PARSE_ERROR: i64 = 101;
pub const BAD_CALL_ERROR: i64 = 102;
pub const SEQUENCE_ERROR: i64 = 103;
pub const SERVICE_ERROR: i64 = 104;
pub const PROCEDURE_NOT_FOUND_ERROR: i64 = 105;

const JSONRPC_VERSION: &str = "2.0";
const ERROR_NAME: &str = "JSONRPCError";
const FALLBACK_ERROR: &str = r#"{"jsonrpc":"2.0","id":"","error":{"code":100,"message":"failed to serialize response","name":"JSONRPCError"}}"#;

pub trait JsonEncoder: Send + Sync {
    fn encode_extension(&self, value: &RpcValue) -> Result<Value, EncodeError> {
        Err(EncodeError::Unsupported(value.kind()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StrictEncoder;

impl JsonEncoder for StrictEncoder {}

/// Renders datetimes and dates as ISO 8601 text, binary as base64 and
/// decimals as their exact decimal text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextualEncoder;

impl JsonEncoder for TextualEncoder {
    fn encode_extension(&self, value: &RpcValue) -> Result<Value, EncodeError> {
        match value {
            RpcValue::DateTime(stamp) => Ok(Value::String(
                stamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            )),
            RpcValue::Date(date) => Ok(Value::String(date.format("%Y-%m-%d").to_string())),
            RpcValue::Binary(bytes) => Ok(Value::String(STANDARD.encode(bytes))),
            RpcValue::Decimal(decimal) => Ok(Value::String(decimal.to_string())),
            other => Err(EncodeError::Unsupported(other.kind())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonCall {
    pub id: Value,
    pub method: String,
    pub params: Vec<RpcValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub id: Value,
    pub fault: Fault,
}

#[derive(Serialize)]
struct ResultEnvelope<'a> {
    jsonrpc: &'static str,
    id: &'a Value,
    result: Value,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    jsonrpc: &'static str,
    id: &'a Value,
    error: ErrorObject<'a>,
}

#[derive(Serialize)]
struct ErrorObject<'a> {
    code: i64,
    message: &'a str,
    name: &'static str,
}

#[derive(Clone)]
pub struct JsonRpcCodec {
    encoder: Arc<dyn JsonEncoder>,
}

impl JsonRpcCodec {
    pub fn new() -> Self {
        Self::with_encoder(Arc::new(StrictEncoder))
    }

    pub fn with_encoder(encoder: Arc<dyn JsonEncoder>) -> Self {
        Self { encoder }
    }

    pub fn decode_request(&self, body: &[u8]) -> Result<JsonCall, Rejected> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|_| rejected(empty_id(), PARSE_ERROR, "JSON decoding error"))?;

        let Value::Object(mut request) = payload else {
            return Err(rejected(
                empty_id(),
                BAD_CALL_ERROR,
                "Cannot decode to a javascript Object",
            ));
        };

        let id = request.remove("id").unwrap_or_else(empty_id);

        let method = match request.remove("method") {
            Some(Value::String(method)) => method,
            Some(_) => {
                return Err(rejected(
                    id,
                    BAD_CALL_ERROR,
                    "method must be a javascript String",
                ))
            }
            None => {
                return Err(rejected(
                    id,
                    BAD_CALL_ERROR,
                    "JSONRPC requests must have the attribute 'method'",
                ))
            }
        };

        let params = match request.remove("params") {
            None => Vec::new(),
            Some(Value::Array(items)) => items.into_iter().map(RpcValue::from).collect(),
            Some(_) => {
                return Err(rejected(
                    id,
                    BAD_CALL_ERROR,
                    "params must be a javascript Array",
                ))
            }
        };

        Ok(JsonCall { id, method, params })
    }

    pub fn error_for(&self, err: &InvokeError) -> Fault {
        match err {
            InvokeError::NotFound(_) => Fault {
                code: PROCEDURE_NOT_FOUND_ERROR,
                message: err.to_string(),
            },
            InvokeError::Procedure(ProcedureError::Fault { code, message }) => Fault {
                code: *code,
                message: message.clone(),
            },
            InvokeError::Procedure(other) => Fault {
                code: SERVICE_ERROR,
                message: other.to_string(),
            },
        }
    }

    pub fn encode_result(&self, id: &Value, value: &RpcValue) -> String {
        let encoded = value.to_json_with(&|extension: &RpcValue| {
            self.encoder.encode_extension(extension)
        });

        match encoded {
            Ok(result) => serde_json::to_string(&ResultEnvelope {
                jsonrpc: JSONRPC_VERSION,
                id,
                result,
            })
            .unwrap_or_else(|_| FALLBACK_ERROR.to_string()),
            Err(err) => {
                warn!(error = %err, "jsonrpc result could not be encoded");
                self.encode_error(
                    id,
                    &Fault {
                        code: SERVICE_ERROR,
                        message: "failed to encode return value".to_string(),
                    },
                )
            }
        }
    }

    pub fn encode_error(&self, id: &Value, fault: &Fault) -> String {
        serde_json::to_string(&ErrorEnvelope {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: ErrorObject {
                code: fault.code,
                message: &fault.message,
                name: ERROR_NAME,
            },
        })
        .unwrap_or_else(|_| FALLBACK_ERROR.to_string())
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_id() -> Value {
    Value::String(String::new())
}

fn rejected(id: Value, code: i64, message: &str) -> Rejected {
    Rejected {
        id,
        fault: Fault {
            code,
            message: message.to_string(),
        },
    }
}
