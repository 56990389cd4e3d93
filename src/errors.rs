use thiserror::Error;

use crate::protocol::Protocol;

/// Error raised by a procedure, or by the dispatcher while shaping a call to it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcedureError {
    /// Carries an explicit protocol code that both codecs pass through verbatim.
    #[error("{message}")]
    Fault { code: i64, message: String },
    #[error("{name}() takes {expected} arguments ({given} given)")]
    Arity {
        name: String,
        expected: String,
        given: usize,
    },
    #[error("{name}() got an unexpected keyword argument '{keyword}'")]
    UnexpectedKeyword { name: String, keyword: String },
    #[error("argument {position}: expected {expected}")]
    InvalidArgument {
        position: usize,
        expected: &'static str,
    },
    #[error("{0}")]
    Application(String),
}

impl ProcedureError {
    pub fn fault(code: i64, message: impl Into<String>) -> Self {
        Self::Fault {
            code,
            message: message.into(),
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::Application(message.into())
    }

    /// Call-shape mismatches are the only errors that allow the keyword-free retry.
    pub fn is_call_shape_mismatch(&self) -> bool {
        matches!(self, Self::Arity { .. } | Self::UnexpectedKeyword { .. })
    }
}

/// Failure to run a named procedure, shared by both codecs.
#[derive(Debug, Error, PartialEq)]
pub enum InvokeError {
    #[error("method \"{0}\" is not supported")]
    NotFound(String),
    #[error(transparent)]
    Procedure(#[from] ProcedureError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("procedure name \"{0}\" is reserved for introspection")]
    ReservedName(String),
}

/// Outcomes the transport has to map itself; everything else is answered in-band.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{0} requests are disabled")]
    ProtocolDisabled(Protocol),
    #[error("permission \"{permission}\" required for method \"{method}\"")]
    PermissionDenied { method: String, permission: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{0} values cannot be encoded")]
    Unsupported(&'static str),
    #[error("non-finite double cannot be encoded")]
    NonFinite,
    #[error("int exceeds XML-RPC limits")]
    IntOverflow,
}
