use std::collections::BTreeMap;

use crate::errors::ProcedureError;
use crate::value::RpcValue;

pub type Keywords = BTreeMap<String, RpcValue>;

/// Arguments handed to a procedure for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    args: &'a [RpcValue],
    keywords: &'a Keywords,
}

impl<'a> Call<'a> {
    pub fn new(args: &'a [RpcValue], keywords: &'a Keywords) -> Self {
        Self { args, keywords }
    }

    pub fn args(&self) -> &'a [RpcValue] {
        self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn keywords(&self) -> &'a Keywords {
        self.keywords
    }

    pub fn keyword(&self, name: &str) -> Option<&'a RpcValue> {
        self.keywords.get(name)
    }

    pub fn arg(&self, position: usize) -> Result<&'a RpcValue, ProcedureError> {
        self.args.get(position).ok_or_else(|| {
            ProcedureError::application(format!("missing argument at position {position}"))
        })
    }

    pub fn int(&self, position: usize) -> Result<i64, ProcedureError> {
        self.arg(position)?
            .as_i64()
            .ok_or(ProcedureError::InvalidArgument {
                position,
                expected: "int",
            })
    }

    pub fn double(&self, position: usize) -> Result<f64, ProcedureError> {
        self.arg(position)?
            .as_f64()
            .ok_or(ProcedureError::InvalidArgument {
                position,
                expected: "double",
            })
    }

    pub fn str(&self, position: usize) -> Result<&'a str, ProcedureError> {
        self.arg(position)?
            .as_str()
            .ok_or(ProcedureError::InvalidArgument {
                position,
                expected: "string",
            })
    }

    pub fn bool(&self, position: usize) -> Result<bool, ProcedureError> {
        self.arg(position)?
            .as_bool()
            .ok_or(ProcedureError::InvalidArgument {
                position,
                expected: "boolean",
            })
    }
}
