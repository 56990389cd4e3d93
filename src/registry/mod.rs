//! Procedure registry shared by both protocol codecs
//!
//! Owns the insertion-ordered set of registered procedures, their descriptors, and
//! the call-shaping rules (context injection, keyword retry) applied on invocation.

pub mod call;
pub mod descriptor;
pub mod introspection;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{InvokeError, ProcedureError, RegistryError};
use crate::value::RpcValue;

use call::{Call, Keywords};
use descriptor::{describe, CallShape, Method, Param, ProcedureDescriptor, ProcedureFn};
use introspection::Introspection;

/// Reserved first-parameter name that receives the caller context.
pub const CONTEXT_PARAM: &str = "request";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContext {
    pub caller: Option<RpcValue>,
    pub keywords: Keywords,
}

impl CallContext {
    pub fn with_caller(caller: impl Into<RpcValue>) -> Self {
        Self {
            caller: Some(caller.into()),
            keywords: Keywords::new(),
        }
    }

    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<RpcValue>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSummary {
    pub name: String,
    pub summary: String,
    pub params: Vec<Param>,
    #[serde(rename = "return")]
    pub return_type: String,
}

enum Handler {
    Builtin(Introspection),
    Procedure(Arc<ProcedureFn>),
}

struct Entry {
    descriptor: ProcedureDescriptor,
    shape: CallShape,
    handler: Handler,
}

pub struct ProcedureRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    service_url: String,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            service_url: String::new(),
        }
    }

    pub fn with_introspection(service_url: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.service_url = service_url.into();
        for builtin in Introspection::ALL {
            registry.insert(Entry {
                descriptor: builtin.descriptor(),
                shape: CallShape::default(),
                handler: Handler::Builtin(builtin),
            });
        }
        registry
    }

    pub fn register(
        &mut self,
        method: Method,
        name: Option<&str>,
        signature: Option<&[String]>,
        doc: Option<&str>,
    ) -> Result<&ProcedureDescriptor, RegistryError> {
        let descriptor = describe(&method, name, signature, doc);
        let entry = Entry {
            descriptor,
            shape: method.shape(),
            handler: Handler::Procedure(method.handler()),
        };

        match self.index.get(&entry.descriptor.external_name).copied() {
            Some(position) if matches!(self.entries[position].handler, Handler::Builtin(_)) => {
                warn!(
                    name = %entry.descriptor.external_name,
                    "registration rejected, name is reserved"
                );
                Err(RegistryError::ReservedName(
                    entry.descriptor.external_name.clone(),
                ))
            }
            Some(position) => {
                debug!(name = %entry.descriptor.external_name, "replacing registered procedure");
                self.entries[position] = entry;
                Ok(&self.entries[position].descriptor)
            }
            None => {
                debug!(name = %entry.descriptor.external_name, "procedure registered");
                let position = self.insert(entry);
                Ok(&self.entries[position].descriptor)
            }
        }
    }

    fn insert(&mut self, entry: Entry) -> usize {
        let position = self.entries.len();
        self.index
            .insert(entry.descriptor.external_name.clone(), position);
        self.entries.push(entry);
        position
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.descriptor.external_name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn find(&self, name: &str) -> Option<&ProcedureDescriptor> {
        self.index
            .get(name)
            .map(|&position| &self.entries[position].descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ProcedureDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn describe_all(&self) -> Vec<MethodSummary> {
        self.descriptors()
            .map(|descriptor| MethodSummary {
                name: descriptor.external_name.clone(),
                summary: descriptor.documentation.clone(),
                params: descriptor.get_params(),
                return_type: descriptor.get_returnvalue().to_string(),
            })
            .collect()
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retries once without keywords when only the keywords break the call shape.
    pub fn invoke(
        &self,
        name: &str,
        mut params: Vec<RpcValue>,
        context: &CallContext,
    ) -> Result<RpcValue, InvokeError> {
        let entry = self
            .index
            .get(name)
            .map(|&position| &self.entries[position])
            .ok_or_else(|| InvokeError::NotFound(name.to_string()))?;

        let mut keywords = context.keywords.clone();
        if let Some(caller) = &context.caller {
            let takes_context = entry
                .descriptor
                .params
                .first()
                .is_some_and(|first| first == CONTEXT_PARAM);
            if takes_context {
                keywords.remove(CONTEXT_PARAM);
                params.insert(0, caller.clone());
            } else {
                keywords.insert(CONTEXT_PARAM.to_string(), caller.clone());
            }
        }

        let no_keywords = Keywords::new();
        let keywords = match check_shape(entry, params.len(), &keywords) {
            Ok(()) => &keywords,
            Err(mismatch) if !keywords.is_empty() && mismatch.is_call_shape_mismatch() => {
                debug!(method = %name, error = %mismatch, "retrying call without keyword arguments");
                check_shape(entry, params.len(), &no_keywords)?;
                &no_keywords
            }
            Err(mismatch) => return Err(mismatch.into()),
        };

        let call = Call::new(&params, keywords);
        let result = match &entry.handler {
            Handler::Builtin(builtin) => builtin.run(self, &call),
            Handler::Procedure(handler) => handler(&call),
        };
        Ok(result?)
    }
}

fn check_shape(entry: &Entry, given: usize, keywords: &Keywords) -> Result<(), ProcedureError> {
    let name = &entry.descriptor.external_name;
    if !entry.shape.accepts_keywords {
        if let Some(keyword) = keywords.keys().next() {
            return Err(ProcedureError::UnexpectedKeyword {
                name: name.clone(),
                keyword: keyword.clone(),
            });
        }
    }

    let declared = entry.descriptor.params.len();
    let expected = if entry.shape.variadic {
        (given < declared).then(|| format!("at least {declared}"))
    } else {
        (given != declared).then(|| format!("exactly {declared}"))
    };
    match expected {
        Some(expected) => Err(ProcedureError::Arity {
            name: name.clone(),
            expected,
            given,
        }),
        None => Ok(()),
    }
}

impl Default for ProcedureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("names", &self.list_names())
            .field("service_url", &self.service_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add() -> Method {
        Method::new("add", |call| Ok(RpcValue::Int(call.int(0)? + call.int(1)?)))
            .params(["a", "b"])
            .signature(["int", "int", "int"])
    }

    fn kwargstest() -> Method {
        Method::new("kwargstest", |call| {
            Ok(RpcValue::Bool(call.keyword("c").is_some()))
        })
        .params(["a", "b", "**kwargs"])
    }

    #[test]
    fn list_names_is_sorted() {
        let mut registry = ProcedureRegistry::new();
        for name in ["zeta", "alpha", "Mid"] {
            registry
                .register(add(), Some(name), None, None)
                .expect("registration succeeds");
        }
        assert_eq!(registry.list_names(), vec!["Mid", "alpha", "zeta"]);
    }

    #[test]
    fn describe_all_keeps_registration_order() {
        let mut registry = ProcedureRegistry::new();
        registry.register(add(), Some("zeta"), None, None).expect("zeta");
        registry.register(add(), Some("alpha"), None, None).expect("alpha");

        let names: Vec<String> = registry
            .describe_all()
            .into_iter()
            .map(|summary| summary.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn reregistration_replaces_in_place() {
        let mut registry = ProcedureRegistry::new();
        registry.register(add(), None, None, None).expect("first");
        registry.register(kwargstest(), Some("other"), None, None).expect("other");
        let replacement = Method::new("add", |_call| Ok(RpcValue::from("replaced"))).params(["a", "b"]);
        registry.register(replacement, None, None, None).expect("replacement");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.descriptors().next().map(|d| d.external_name.as_str()), Some("add"));
        let result = registry.invoke("add", vec![RpcValue::Int(1), RpcValue::Int(2)], &CallContext::default());
        assert_eq!(result, Ok(RpcValue::from("replaced")));
    }

    #[test]
    fn introspection_names_cannot_be_shadowed() {
        let mut registry = ProcedureRegistry::with_introspection("");
        let err = registry
            .register(add(), Some("system.listMethods"), None, None)
            .expect_err("reserved name");
        assert_eq!(err, RegistryError::ReservedName("system.listMethods".to_string()));
        assert_eq!(
            registry.find("system.listMethods").map(|d| d.signature.clone()),
            Some(vec!["array".to_string()])
        );
    }

    #[test]
    fn unknown_method_is_not_found() {
        let registry = ProcedureRegistry::new();
        assert_eq!(
            registry.invoke("missing", Vec::new(), &CallContext::default()),
            Err(InvokeError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn keywords_reach_procedures_that_accept_them() {
        let mut registry = ProcedureRegistry::new();
        registry.register(kwargstest(), None, None, None).expect("kwargstest");
        let params = vec![RpcValue::Int(1), RpcValue::Int(2)];

        let without = registry.invoke("kwargstest", params.clone(), &CallContext::default());
        assert_eq!(without, Ok(RpcValue::Bool(false)));

        let context = CallContext::default().keyword("c", 1_i64);
        let with = registry.invoke("kwargstest", params, &context);
        assert_eq!(with, Ok(RpcValue::Bool(true)));
    }

    #[test]
    fn rejected_keywords_trigger_one_retry_without_them() {
        let mut registry = ProcedureRegistry::new();
        registry.register(add(), None, None, None).expect("add");
        let context = CallContext::default().keyword("c", 1_i64);

        let result = registry.invoke("add", vec![RpcValue::Int(1), RpcValue::Int(2)], &context);
        assert_eq!(result, Ok(RpcValue::Int(3)));
    }

    #[test]
    fn retry_without_keywords_reports_the_remaining_mismatch() {
        let mut registry = ProcedureRegistry::new();
        registry.register(add(), None, None, None).expect("add");
        let context = CallContext::default().keyword("c", 1_i64);

        let err = registry
            .invoke("add", vec![RpcValue::Int(1)], &context)
            .expect_err("arity mismatch survives the retry");
        assert_eq!(
            err,
            InvokeError::Procedure(ProcedureError::Arity {
                name: "add".to_string(),
                expected: "exactly 2".to_string(),
                given: 1,
            })
        );
    }

    #[test]
    fn arity_mismatch_without_keywords_is_reported() {
        let mut registry = ProcedureRegistry::new();
        registry.register(add(), None, None, None).expect("add");

        let err = registry
            .invoke("add", vec![RpcValue::Int(1)], &CallContext::default())
            .expect_err("arity mismatch");
        assert_eq!(err.to_string(), "add() takes exactly 2 arguments (1 given)");
    }

    #[test]
    fn procedure_errors_shaped_like_mismatches_are_not_retried() {
        let mut registry = ProcedureRegistry::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let flaky = Method::new("flaky", move |_call| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(ProcedureError::Arity {
                name: "inner".to_string(),
                expected: "exactly 3".to_string(),
                given: 0,
            })
        })
        .accepts_keywords();
        registry.register(flaky, None, None, None).expect("flaky");

        let context = CallContext::default().keyword("c", 1_i64);
        assert!(registry.invoke("flaky", Vec::new(), &context).is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn caller_context_is_prepended_for_context_param() {
        let mut registry = ProcedureRegistry::new();
        let whoami = Method::new("whoami", |call| Ok(call.arg(0)?.clone()))
            .params([CONTEXT_PARAM, "suffix"]);
        registry.register(whoami, None, None, None).expect("whoami");

        let context = CallContext::with_caller("alice");
        let result = registry.invoke("whoami", vec![RpcValue::from("!")], &context);
        assert_eq!(result, Ok(RpcValue::from("alice")));
    }

    #[test]
    fn unused_caller_context_does_not_break_plain_procedures() {
        let mut registry = ProcedureRegistry::new();
        registry.register(add(), None, None, None).expect("add");

        let context = CallContext::with_caller("alice");
        let result = registry.invoke("add", vec![RpcValue::Int(2), RpcValue::Int(3)], &context);
        assert_eq!(result, Ok(RpcValue::Int(5)));
    }

    #[test]
    fn variadic_procedures_take_extra_arguments() {
        let mut registry = ProcedureRegistry::new();
        let sum = Method::new("sum", |call| {
            let mut total = 0;
            for position in 0..call.len() {
                total += call.int(position)?;
            }
            Ok(RpcValue::Int(total))
        })
        .params(["first", "*rest"]);
        registry.register(sum, None, None, None).expect("sum");

        let args = vec![RpcValue::Int(1), RpcValue::Int(2), RpcValue::Int(3)];
        assert_eq!(registry.invoke("sum", args, &CallContext::default()), Ok(RpcValue::Int(6)));
        assert!(registry.invoke("sum", Vec::new(), &CallContext::default()).is_err());
    }
}
