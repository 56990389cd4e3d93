//! Procedure definitions and the descriptors derived from them at registration.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::errors::ProcedureError;
use crate::registry::call::Call;
use crate::value::RpcValue;

pub const UNTYPED: &str = "object";

const RECEIVER_PARAM: &str = "self";

pub type ProcedureFn = dyn Fn(&Call<'_>) -> Result<RpcValue, ProcedureError> + Send + Sync;

#[derive(Clone)]
pub struct Method {
    ident: String,
    exposed_as: Option<String>,
    params: Vec<String>,
    signature: Option<Vec<String>>,
    doc: String,
    permission: Option<String>,
    shape: CallShape,
    handler: Arc<ProcedureFn>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallShape {
    pub variadic: bool,
    pub accepts_keywords: bool,
}

impl Method {
    pub fn new<F>(ident: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Call<'_>) -> Result<RpcValue, ProcedureError> + Send + Sync + 'static,
    {
        Self {
            ident: ident.into(),
            exposed_as: None,
            params: Vec::new(),
            signature: None,
            doc: String::new(),
            permission: None,
            shape: CallShape::default(),
            handler: Arc::new(handler),
        }
    }

    // Drops a leading `self`; trailing `**kw` and `*args` only set the shape.
    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut declared: Vec<String> = params.into_iter().map(Into::into).collect();
        if declared.first().is_some_and(|first| first == RECEIVER_PARAM) {
            declared.remove(0);
        }
        if declared.last().is_some_and(|last| last.starts_with("**")) {
            declared.pop();
            self.shape.accepts_keywords = true;
        }
        if declared.last().is_some_and(|last| last.starts_with('*')) {
            declared.pop();
            self.shape.variadic = true;
        }
        self.params = declared;
        self
    }

    pub fn exposed_as(mut self, name: impl Into<String>) -> Self {
        self.exposed_as = Some(name.into());
        self
    }

    pub fn signature<I, S>(mut self, signature: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature = Some(signature.into_iter().map(Into::into).collect());
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn accepts_keywords(mut self) -> Self {
        self.shape.accepts_keywords = true;
        self
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub(crate) fn shape(&self) -> CallShape {
        self.shape
    }

    pub(crate) fn handler(&self) -> Arc<ProcedureFn> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("ident", &self.ident)
            .field("exposed_as", &self.exposed_as)
            .field("params", &self.params)
            .field("signature", &self.signature)
            .field("permission", &self.permission)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "rpctype")]
    pub type_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureDescriptor {
    pub external_name: String,
    pub params: Vec<String>,
    pub signature: Vec<String>,
    pub documentation: String,
    pub required_permission: Option<String>,
}

impl ProcedureDescriptor {
    pub fn get_params(&self) -> Vec<Param> {
        let typed = self.signature.len() == self.params.len() + 1;
        self.params
            .iter()
            .enumerate()
            .map(|(index, name)| Param {
                name: name.clone(),
                type_tag: if typed {
                    self.signature[index + 1].clone()
                } else {
                    UNTYPED.to_string()
                },
            })
            .collect()
    }

    pub fn get_returnvalue(&self) -> &str {
        self.signature.first().map_or(UNTYPED, String::as_str)
    }

    pub fn json_stub(&self) -> String {
        let quote = |text: &str| Value::String(text.to_string()).to_string();
        let params = self
            .params
            .iter()
            .map(|name| quote(name))
            .collect::<Vec<_>>()
            .join(",");
        [
            "{".to_string(),
            "\"id\": \"rpcmux\",".to_string(),
            format!("\"method\": {},", quote(&self.external_name)),
            "\"params\": [".to_string(),
            format!("   {params}"),
            "]".to_string(),
            "}".to_string(),
        ]
        .join("\n")
    }
}

pub fn describe(
    method: &Method,
    name: Option<&str>,
    signature: Option<&[String]>,
    doc: Option<&str>,
) -> ProcedureDescriptor {
    let external_name = name
        .map(str::to_string)
        .or_else(|| method.exposed_as.clone())
        .unwrap_or_else(|| method.ident.clone());

    let expected_len = method.params.len() + 1;
    let signature = method
        .signature
        .as_deref()
        .filter(|attached| attached.len() == expected_len)
        .or(signature.filter(|explicit| explicit.len() == expected_len))
        .map(<[String]>::to_vec)
        .unwrap_or_else(|| vec![UNTYPED.to_string(); expected_len]);

    ProcedureDescriptor {
        external_name,
        params: method.params.clone(),
        signature,
        documentation: doc.map_or_else(|| method.doc.clone(), str::to_string),
        required_permission: method.permission.clone(),
    }
}
