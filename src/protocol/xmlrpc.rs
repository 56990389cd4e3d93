//! XML-RPC codec
//!
//! Decodes `methodCall` documents through the hardened reader in
//! [`crate::protocol::xml`] and marshals `methodResponse` documents in the
//! layout common XML-RPC libraries emit.

use std::fmt::Write as _;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use quick_xml::escape::partial_escape;
use thiserror::Error;

use crate::errors::{EncodeError, InvokeError, ProcedureError};
use crate::protocol::xml::{self, Element, XmlError};
use crate::protocol::Fault;
use crate::value::{RpcValue, Struct};

/// Fault code for every failure that carries no code of its own.
pub const GENERIC_FAULT: i64 = 1;

const XML_DECL: &str = "<?xml version='1.0'?>\n";
const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";
const DATETIME_FORMAT_DASHED: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XmlRpcError {
    #[error(transparent)]
    Xml(#[from] XmlError),
    #[error("expected <{expected}> but found <{found}>")]
    UnexpectedElement { expected: &'static str, found: String },
    #[error("missing <{0}> element")]
    Missing(&'static str),
    #[error("unknown value type <{0}>")]
    UnknownType(String),
    #[error("invalid {kind} value: {text:?}")]
    InvalidValue { kind: &'static str, text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<RpcValue>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlRpcCodec;

impl XmlRpcCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn decode_request(&self, body: &[u8]) -> Result<MethodCall, Fault> {
        decode_call(body).map_err(|err| generic_fault(&err))
    }

    pub fn error_for(&self, err: &InvokeError) -> Fault {
        match err {
            InvokeError::Procedure(ProcedureError::Fault { code, message }) => Fault {
                code: *code,
                message: message.clone(),
            },
            other => generic_fault(other),
        }
    }

    pub fn encode_result(&self, value: &RpcValue) -> String {
        marshal_response(value).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "xmlrpc result could not be marshaled");
            marshal_fault(&generic_fault(&err))
        })
    }

    pub fn encode_error(&self, fault: &Fault) -> String {
        marshal_fault(fault)
    }
}

fn generic_fault(err: &dyn std::fmt::Display) -> Fault {
    Fault {
        code: GENERIC_FAULT,
        message: format!("Unknown error, {err}"),
    }
}

pub fn decode_call(body: &[u8]) -> Result<MethodCall, XmlRpcError> {
    let root = xml::parse(body)?;
    if root.name != "methodCall" {
        return Err(XmlRpcError::UnexpectedElement {
            expected: "methodCall",
            found: root.name,
        });
    }

    let method_name = root
        .child("methodName")
        .ok_or(XmlRpcError::Missing("methodName"))?
        .text()
        .trim()
        .to_string();

    let params = match root.child("params") {
        Some(params) => params
            .elements()
            .map(|param| {
                expect_name(param, "param")?;
                decode_value(param.child("value").ok_or(XmlRpcError::Missing("value"))?)
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(MethodCall {
        method_name,
        params,
    })
}

fn expect_name(element: &Element, expected: &'static str) -> Result<(), XmlRpcError> {
    if element.name == expected {
        Ok(())
    } else {
        Err(XmlRpcError::UnexpectedElement {
            expected,
            found: element.name.clone(),
        })
    }
}

fn decode_value(value: &Element) -> Result<RpcValue, XmlRpcError> {
    let Some(typed) = value.elements().next() else {
        return Ok(RpcValue::String(value.text()));
    };

    let text = typed.text();
    let invalid = |kind: &'static str| XmlRpcError::InvalidValue {
        kind,
        text: text.clone(),
    };

    match typed.name.as_str() {
        "i4" | "int" | "i8" => text
            .trim()
            .parse::<i64>()
            .map(RpcValue::Int)
            .map_err(|_| invalid("int")),
        "boolean" => match text.trim() {
            "1" => Ok(RpcValue::Bool(true)),
            "0" => Ok(RpcValue::Bool(false)),
            _ => Err(invalid("boolean")),
        },
        "string" => Ok(RpcValue::String(typed.text())),
        "double" => text
            .trim()
            .parse::<f64>()
            .map(RpcValue::Double)
            .map_err(|_| invalid("double")),
        "bigdecimal" => BigDecimal::from_str(text.trim())
            .map(RpcValue::Decimal)
            .map_err(|_| invalid("bigdecimal")),
        "dateTime.iso8601" => {
            let trimmed = text.trim();
            NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT_DASHED))
                .map(RpcValue::DateTime)
                .map_err(|_| invalid("dateTime.iso8601"))
        }
        "base64" => {
            let compact: String = text.split_whitespace().collect();
            STANDARD
                .decode(compact)
                .map(RpcValue::Binary)
                .map_err(|_| invalid("base64"))
        }
        "struct" => {
            let mut members = Struct::new();
            for member in typed.elements() {
                expect_name(member, "member")?;
                let name = member
                    .child("name")
                    .ok_or(XmlRpcError::Missing("name"))?
                    .text();
                let item = member.child("value").ok_or(XmlRpcError::Missing("value"))?;
                members.insert(name, decode_value(item)?);
            }
            Ok(RpcValue::Struct(members))
        }
        "array" => {
            let data = typed.child("data").ok_or(XmlRpcError::Missing("data"))?;
            data.elements()
                .map(|item| {
                    expect_name(item, "value")?;
                    decode_value(item)
                })
                .collect::<Result<Vec<_>, _>>()
                .map(RpcValue::Array)
        }
        "nil" => Ok(RpcValue::Nil),
        other => Err(XmlRpcError::UnknownType(other.to_string())),
    }
}

/// Marshals `value` as the single parameter of a `methodResponse`.
pub fn marshal_response(value: &RpcValue) -> Result<String, EncodeError> {
    let mut out = String::from(XML_DECL);
    out.push_str("<methodResponse>\n<params>\n<param>\n");
    marshal_value(value, &mut out)?;
    out.push_str("</param>\n</params>\n</methodResponse>\n");
    Ok(out)
}

pub fn marshal_fault(fault: &Fault) -> String {
    let mut out = String::from(XML_DECL);
    out.push_str("<methodResponse>\n<fault>\n");
    out.push_str("<value><struct>\n");
    out.push_str("<member>\n<name>faultCode</name>\n");
    let _ = writeln!(out, "<value><int>{}</int></value>", fault.code);
    out.push_str("</member>\n<member>\n<name>faultString</name>\n");
    let _ = writeln!(
        out,
        "<value><string>{}</string></value>",
        partial_escape(&fault.message)
    );
    out.push_str("</member>\n</struct></value>\n");
    out.push_str("</fault>\n</methodResponse>\n");
    out
}

fn marshal_value(value: &RpcValue, out: &mut String) -> Result<(), EncodeError> {
    match value {
        RpcValue::Nil => out.push_str("<value><nil/></value>"),
        RpcValue::Bool(flag) => {
            let _ = write!(out, "<value><boolean>{}</boolean></value>", u8::from(*flag));
        }
        RpcValue::Int(int) => {
            let int = i32::try_from(*int).map_err(|_| EncodeError::IntOverflow)?;
            let _ = write!(out, "<value><int>{int}</int></value>");
        }
        RpcValue::Double(double) => {
            if !double.is_finite() {
                return Err(EncodeError::NonFinite);
            }
            // Display never switches to exponent notation.
            let mut text = double.to_string();
            if !text.contains('.') {
                text.push_str(".0");
            }
            let _ = write!(out, "<value><double>{text}</double></value>");
        }
        RpcValue::Decimal(decimal) => {
            let _ = write!(out, "<value><double>{decimal}</double></value>");
        }
        RpcValue::String(text) => {
            let _ = write!(out, "<value><string>{}</string></value>", partial_escape(text));
        }
        RpcValue::DateTime(stamp) => marshal_datetime(stamp, out),
        RpcValue::Date(date) => marshal_datetime(&midnight(*date), out),
        RpcValue::Binary(bytes) => {
            let _ = write!(
                out,
                "<value><base64>\n{}\n</base64></value>",
                STANDARD.encode(bytes)
            );
        }
        RpcValue::Array(items) => {
            out.push_str("<value><array><data>\n");
            for item in items {
                marshal_value(item, out)?;
            }
            out.push_str("</data></array></value>");
        }
        RpcValue::Struct(members) => {
            out.push_str("<value><struct>\n");
            for (name, item) in members {
                let _ = writeln!(out, "<member>\n<name>{}</name>", partial_escape(name));
                marshal_value(item, out)?;
                out.push_str("</member>\n");
            }
            out.push_str("</struct></value>");
        }
    }
    out.push('\n');
    Ok(())
}

fn marshal_datetime(stamp: &NaiveDateTime, out: &mut String) {
    let _ = write!(
        out,
        "<value><dateTime.iso8601>{}</dateTime.iso8601></value>",
        stamp.format(DATETIME_FORMAT)
    );
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(body: &str) -> MethodCall {
        decode_call(body.as_bytes()).expect("valid method call")
    }

    #[test]
    fn decodes_method_name_and_typed_params() {
        let decoded = call(
            "<?xml version=\"1.0\"?><methodCall><methodName>add</methodName><params>\
             <param><value><i4>1</i4></value></param>\
             <param><value><int>2</int></value></param>\
             <param><value><boolean>1</boolean></value></param>\
             <param><value><double>2.5</double></value></param>\
             <param><value>bare</value></param>\
             </params></methodCall>",
        );
        assert_eq!(decoded.method_name, "add");
        assert_eq!(
            decoded.params,
            vec![
                RpcValue::Int(1),
                RpcValue::Int(2),
                RpcValue::Bool(true),
                RpcValue::Double(2.5),
                RpcValue::from("bare"),
            ]
        );
    }

    #[test]
    fn decodes_structs_arrays_dates_and_binary() {
        let decoded = call(
            "<methodCall><methodName>m</methodName><params><param><value><struct>\
             <member><name>when</name><value><dateTime.iso8601>20240229T10:30:00</dateTime.iso8601></value></member>\
             <member><name>blob</name><value><base64>aGk=</base64></value></member>\
             <member><name>list</name><value><array><data><value><string>a</string></value><value><nil/></value></data></array></value></member>\
             </struct></value></param></params></methodCall>",
        );
        let members = decoded.params[0].as_struct().expect("struct param");
        let when = NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|date| date.and_hms_opt(10, 30, 0))
            .expect("valid timestamp");
        assert_eq!(members["when"], RpcValue::DateTime(when));
        assert_eq!(members["blob"], RpcValue::Binary(b"hi".to_vec()));
        assert_eq!(
            members["list"],
            RpcValue::Array(vec![RpcValue::from("a"), RpcValue::Nil])
        );
    }

    #[test]
    fn string_whitespace_is_preserved() {
        let decoded = call(
            "<methodCall><methodName>echo</methodName><params><param><value><string> padded </string></value></param></params></methodCall>",
        );
        assert_eq!(decoded.params, vec![RpcValue::from(" padded ")]);
    }

    #[test]
    fn missing_params_element_means_no_params() {
        let decoded = call("<methodCall><methodName>system.listMethods</methodName></methodCall>");
        assert!(decoded.params.is_empty());
    }

    #[test]
    fn rejects_other_root_elements_and_unknown_types() {
        assert!(matches!(
            decode_call(b"<methodResponse/>"),
            Err(XmlRpcError::UnexpectedElement { .. })
        ));
        assert_eq!(
            decode_call(
                b"<methodCall><methodName>m</methodName><params><param><value><float>1</float></value></param></params></methodCall>"
            ),
            Err(XmlRpcError::UnknownType("float".to_string()))
        );
    }

    #[test]
    fn marshals_string_array_response() {
        let body = marshal_response(&RpcValue::from(vec!["a", "b"])).expect("marshal");
        assert_eq!(
            body.replace('\n', ""),
            "<?xml version='1.0'?><methodResponse><params><param><value><array><data>\
             <value><string>a</string></value><value><string>b</string></value>\
             </data></array></value></param></params></methodResponse>"
        );
    }

    #[test]
    fn dates_are_widened_to_midnight_timestamps() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).expect("valid date");
        let body = marshal_response(&RpcValue::Date(date)).expect("marshal");
        assert!(body.contains("<dateTime.iso8601>20240105T00:00:00</dateTime.iso8601>"));
    }

    #[test]
    fn binary_uses_base64_wrapper() {
        let body = marshal_response(&RpcValue::Binary(vec![0x97, 0xd2, 0xab])).expect("marshal");
        assert!(body.contains("<base64>\nl9Kr\n</base64>"));
    }

    #[test]
    fn decimals_keep_exact_text() {
        let decimal = BigDecimal::from_str("12345678901234567890.000000001").expect("decimal");
        let body = marshal_response(&RpcValue::Decimal(decimal)).expect("marshal");
        assert!(body.contains("<double>12345678901234567890.000000001</double>"));
    }

    #[test]
    fn bigdecimal_values_decode_exactly() {
        let call = call(
            "<methodCall><methodName>echo</methodName><params>\
             <param><value><bigdecimal>1.10</bigdecimal></value></param>\
             </params></methodCall>",
        );
        let expected = BigDecimal::from_str("1.10").expect("decimal");
        assert_eq!(call.params, vec![RpcValue::Decimal(expected)]);

        let body = marshal_response(&call.params[0]).expect("marshal");
        assert!(body.contains("<double>1.10</double>"));
        assert_eq!(
            decode_call(
                b"<methodCall><methodName>m</methodName><params><param><value><bigdecimal>x</bigdecimal></value></param></params></methodCall>"
            ),
            Err(XmlRpcError::InvalidValue {
                kind: "bigdecimal",
                text: "x".to_string()
            })
        );
    }

    #[test]
    fn doubles_use_plain_notation() {
        let body = marshal_response(&RpcValue::Array(vec![
            RpcValue::Double(1e20),
            RpcValue::Double(2.5),
            RpcValue::Double(-3.0),
        ]))
        .expect("marshal");
        assert!(body.contains("<double>100000000000000000000.0</double>"));
        assert!(body.contains("<double>2.5</double>"));
        assert!(body.contains("<double>-3.0</double>"));
    }

    #[test]
    fn non_finite_doubles_fail_to_marshal() {
        assert_eq!(
            marshal_response(&RpcValue::Double(f64::NAN)),
            Err(EncodeError::NonFinite)
        );
        assert_eq!(
            marshal_response(&RpcValue::Double(f64::INFINITY)),
            Err(EncodeError::NonFinite)
        );
    }

    #[test]
    fn ints_beyond_32_bits_fail_to_marshal() {
        assert_eq!(
            marshal_response(&RpcValue::Int(i64::from(i32::MAX) + 1)),
            Err(EncodeError::IntOverflow)
        );
    }

    #[test]
    fn text_is_escaped() {
        let body = marshal_response(&RpcValue::from("a<b&c")).expect("marshal");
        assert!(body.contains("<string>a&lt;b&amp;c</string>"));
    }

    #[test]
    fn fault_layout_matches_struct_convention() {
        let body = marshal_fault(&Fault {
            code: GENERIC_FAULT,
            message: "Unknown error, boom".to_string(),
        });
        assert_eq!(
            body.replace('\n', ""),
            "<?xml version='1.0'?><methodResponse><fault><value><struct>\
             <member><name>faultCode</name><value><int>1</int></value></member>\
             <member><name>faultString</name><value><string>Unknown error, boom</string></value></member>\
             </struct></value></fault></methodResponse>"
        );
    }

    #[test]
    fn codec_passes_explicit_fault_codes_through() {
        let codec = XmlRpcCodec::new();
        let fault = codec.error_for(&InvokeError::Procedure(ProcedureError::fault(
            -32500,
            "No method found with name: x",
        )));
        assert_eq!(fault.code, -32500);

        let fault = codec.error_for(&InvokeError::NotFound("x".to_string()));
        assert_eq!(fault.code, GENERIC_FAULT);
        assert_eq!(fault.message, "Unknown error, method \"x\" is not supported");
    }
}
