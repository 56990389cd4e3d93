//! Wire protocols and request routing
//!
//! Detects the protocol of a raw request and runs it through the matching
//! codec: decode, invoke through the shared registry, encode.

pub mod jsonrpc;
pub mod xml;
pub mod xmlrpc;

use std::fmt;

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::InvokeError;
use crate::registry::{CallContext, ProcedureRegistry};
use crate::value::RpcValue;

use jsonrpc::JsonRpcCodec;
use xmlrpc::XmlRpcCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    JsonRpc,
    XmlRpc,
}

impl Protocol {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::JsonRpc => "application/json",
            Self::XmlRpc => "text/xml",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::JsonRpc => "JSON-RPC",
            Self::XmlRpc => "XML-RPC",
        })
    }
}

/// An error code and message, rendered as a JSON-RPC error object or an XML-RPC fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

/// Picks the protocol of a request.
///
/// An exact XML content type wins, then any content type mentioning `json` or
/// `javascript`, then a successful XML parse of the body; JSON-RPC otherwise.
/// `log_sniffing` reports the fallback to body analysis.
pub fn detect(content_type: Option<&str>, body: &[u8], log_sniffing: bool) -> Protocol {
    if let Some(content_type) = content_type {
        if content_type == "text/xml" || content_type == "application/xml" {
            return Protocol::XmlRpc;
        }
        if content_type.contains("json") || content_type.contains("javascript") {
            return Protocol::JsonRpc;
        }
    }

    if log_sniffing {
        info!(
            content_type = content_type.unwrap_or("unknown type"),
            "unrecognized content type, analyzing request body"
        );
    }
    if xml::parse(body).is_ok() {
        Protocol::XmlRpc
    } else {
        Protocol::JsonRpc
    }
}

/// Outcome of one dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub method: Option<String>,
    pub succeeded: bool,
    pub body: String,
}

#[derive(Clone)]
pub enum Codec {
    Json(JsonRpcCodec),
    Xml(XmlRpcCodec),
}

struct Decoded {
    id: Value,
    method: String,
    params: Vec<RpcValue>,
}

impl Codec {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Json(_) => Protocol::JsonRpc,
            Self::Xml(_) => Protocol::XmlRpc,
        }
    }

    fn decode_request(&self, body: &[u8]) -> Result<Decoded, (Value, Fault)> {
        match self {
            Self::Json(codec) => codec
                .decode_request(body)
                .map(|call| Decoded {
                    id: call.id,
                    method: call.method,
                    params: call.params,
                })
                .map_err(|rejected| (rejected.id, rejected.fault)),
            Self::Xml(codec) => codec
                .decode_request(body)
                .map(|call| Decoded {
                    id: Value::Null,
                    method: call.method_name,
                    params: call.params,
                })
                .map_err(|fault| (Value::Null, fault)),
        }
    }

    fn encode_result(&self, id: &Value, value: &RpcValue) -> String {
        match self {
            Self::Json(codec) => codec.encode_result(id, value),
            Self::Xml(codec) => codec.encode_result(value),
        }
    }

    fn encode_error(&self, id: &Value, fault: &Fault) -> String {
        match self {
            Self::Json(codec) => codec.encode_error(id, fault),
            Self::Xml(codec) => codec.encode_error(fault),
        }
    }

    fn error_for(&self, err: &InvokeError) -> Fault {
        match self {
            Self::Json(codec) => codec.error_for(err),
            Self::Xml(codec) => codec.error_for(err),
        }
    }

    /// Decodes `body`, invokes the named procedure and encodes the outcome.
    ///
    /// Every failure is answered in-band with the protocol's error document.
    pub fn dispatch(
        &self,
        registry: &ProcedureRegistry,
        body: &[u8],
        context: &CallContext,
    ) -> Dispatched {
        let request = match self.decode_request(body) {
            Ok(request) => request,
            Err((id, fault)) => {
                debug!(protocol = %self.protocol(), code = fault.code, error = %fault.message, "request rejected");
                return Dispatched {
                    method: None,
                    succeeded: false,
                    body: self.encode_error(&id, &fault),
                };
            }
        };

        match registry.invoke(&request.method, request.params, context) {
            Ok(value) => Dispatched {
                method: Some(request.method),
                succeeded: true,
                body: self.encode_result(&request.id, &value),
            },
            Err(err) => {
                let fault = self.error_for(&err);
                debug!(
                    protocol = %self.protocol(),
                    method = %request.method,
                    code = fault.code,
                    error = %fault.message,
                    "call failed"
                );
                Dispatched {
                    method: Some(request.method),
                    succeeded: false,
                    body: self.encode_error(&request.id, &fault),
                }
            }
        }
    }
}
