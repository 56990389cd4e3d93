//! The built-in `system.*` procedures describing the registry itself.

use crate::errors::ProcedureError;
use crate::registry::call::Call;
use crate::registry::descriptor::ProcedureDescriptor;
use crate::registry::{MethodSummary, ProcedureRegistry};
use crate::value::RpcValue;

/// Fault code for application-level introspection failures (xmlrpc-epi convention).
pub const APPLICATION_ERROR: i64 = -32500;

pub const SERVICE_TYPE: &str = "rpcmux JSONRPC+XMLRPC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Introspection {
    ListMethods,
    MethodHelp,
    MethodSignature,
    Describe,
}

impl Introspection {
    pub const ALL: [Introspection; 4] = [
        Self::ListMethods,
        Self::MethodHelp,
        Self::MethodSignature,
        Self::Describe,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ListMethods => "system.listMethods",
            Self::MethodHelp => "system.methodHelp",
            Self::MethodSignature => "system.methodSignature",
            Self::Describe => "system.describe",
        }
    }

    pub(crate) fn descriptor(self) -> ProcedureDescriptor {
        match self {
            Self::ListMethods => builtin(
                self,
                &[],
                &["array"],
                "Returns a list of supported methods",
            ),
            Self::MethodHelp => builtin(
                self,
                &["method_name"],
                &["string", "string"],
                "Returns documentation for a specified method",
            ),
            Self::MethodSignature => builtin(
                self,
                &["method_name"],
                &["array", "string"],
                "Returns the signature for a specified method",
            ),
            Self::Describe => builtin(
                self,
                &[],
                &["struct"],
                "Returns a simple method description of the methods supported",
            ),
        }
    }

    pub(crate) fn run(
        self,
        registry: &ProcedureRegistry,
        call: &Call<'_>,
    ) -> Result<RpcValue, ProcedureError> {
        match self {
            Self::ListMethods => Ok(RpcValue::from(registry.list_names())),
            Self::MethodHelp => {
                let descriptor = lookup(registry, call.str(0)?)?;
                Ok(RpcValue::from(descriptor.documentation.clone()))
            }
            Self::MethodSignature => {
                let descriptor = lookup(registry, call.str(0)?)?;
                Ok(RpcValue::from(descriptor.signature.clone()))
            }
            Self::Describe => Ok(RpcValue::structure([
                ("serviceType", RpcValue::from(SERVICE_TYPE)),
                ("serviceURL", RpcValue::from(registry.service_url())),
                (
                    "methods",
                    RpcValue::Array(
                        registry
                            .describe_all()
                            .into_iter()
                            .map(summary_value)
                            .collect(),
                    ),
                ),
            ])),
        }
    }
}

fn builtin(
    which: Introspection,
    params: &[&str],
    signature: &[&str],
    documentation: &str,
) -> ProcedureDescriptor {
    ProcedureDescriptor {
        external_name: which.name().to_string(),
        params: params.iter().map(|param| param.to_string()).collect(),
        signature: signature.iter().map(|tag| tag.to_string()).collect(),
        documentation: documentation.to_string(),
        required_permission: None,
    }
}

fn lookup<'r>(
    registry: &'r ProcedureRegistry,
    name: &str,
) -> Result<&'r ProcedureDescriptor, ProcedureError> {
    registry.find(name).ok_or_else(|| {
        ProcedureError::fault(APPLICATION_ERROR, format!("No method found with name: {name}"))
    })
}

fn summary_value(summary: MethodSummary) -> RpcValue {
    let params = summary
        .params
        .into_iter()
        .map(|param| {
            RpcValue::structure([
                ("name", RpcValue::from(param.name)),
                ("rpctype", RpcValue::from(param.type_tag)),
            ])
        })
        .collect();

    RpcValue::structure([
        ("name", RpcValue::from(summary.name)),
        ("summary", RpcValue::from(summary.summary)),
        ("params", RpcValue::Array(params)),
        ("return", RpcValue::from(summary.return_type)),
    ])
}
