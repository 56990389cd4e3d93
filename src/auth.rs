//! Permission gate consulted before protected procedures run.
//!
//! Evaluating a permission belongs to the embedding application; this module
//! only defines the callback and the lookup of the permission a call needs.

use tracing::{debug, info, warn};

use crate::errors::DispatchError;
use crate::registry::ProcedureRegistry;
use crate::value::RpcValue;

pub trait PermissionChecker: Send + Sync {
    /// Whether `caller` holds `permission`; `caller` is the request's context value.
    fn has_permission(&self, caller: Option<&RpcValue>, permission: &str) -> bool;
}

/// Grants every permission.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn has_permission(&self, _caller: Option<&RpcValue>, _permission: &str) -> bool {
        true
    }
}

impl<F> PermissionChecker for F
where
    F: Fn(Option<&RpcValue>, &str) -> bool + Send + Sync,
{
    fn has_permission(&self, caller: Option<&RpcValue>, permission: &str) -> bool {
        self(caller, permission)
    }
}

pub fn require_permission(
    registry: &ProcedureRegistry,
    method: Option<&str>,
    caller: Option<&RpcValue>,
    checker: &dyn PermissionChecker,
) -> Result<(), DispatchError> {
    let Some(descriptor) = method.and_then(|name| registry.find(name)) else {
        return Ok(());
    };
    let Some(permission) = descriptor.required_permission.as_deref() else {
        debug!(method = %descriptor.external_name, "method is unprotected");
        return Ok(());
    };

    if caller.is_none() {
        warn!(method = %descriptor.external_name, "protected method called without caller context");
    }
    if checker.has_permission(caller, permission) {
        debug!(method = %descriptor.external_name, permission, "caller is authorized");
        return Ok(());
    }

    info!(method = %descriptor.external_name, permission, "caller is not authorized");
    Err(DispatchError::PermissionDenied {
        method: descriptor.external_name.clone(),
        permission: permission.to_string(),
    })
}
