use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::warn;

pub mod auth;
pub mod config;
pub mod errors;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod value;

use auth::PermissionChecker;
use config::DispatcherConfig;
use errors::{DispatchError, RegistryError};
use protocol::jsonrpc::{JsonEncoder, JsonRpcCodec};
use protocol::xmlrpc::{self, XmlRpcCodec};
use protocol::{Codec, Protocol};

pub use registry::call::Call;
pub use registry::descriptor::{Method, ProcedureDescriptor};
pub use registry::{CallContext, ProcedureRegistry};
pub use value::RpcValue;

#[derive(Debug, Clone, Default)]
pub struct RpcRequest<'a> {
    pub body: &'a [u8],
    pub content_type: Option<&'a str>,
    pub context: CallContext,
}

impl<'a> RpcRequest<'a> {
    pub fn new(body: &'a [u8], content_type: Option<&'a str>) -> Self {
        Self {
            body,
            content_type,
            context: CallContext::default(),
        }
    }

    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    pub protocol: Protocol,
    pub content_type: &'static str,
    pub body: String,
}

pub struct RpcDispatcher {
    config: DispatcherConfig,
    registry: ProcedureRegistry,
    json: Codec,
    xml: Codec,
}

impl RpcDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let registry = if config.restrict_introspection {
            ProcedureRegistry::new()
        } else {
            ProcedureRegistry::with_introspection(config.service_url.clone())
        };

        Self {
            config,
            registry,
            json: Codec::Json(JsonRpcCodec::new()),
            xml: Codec::Xml(XmlRpcCodec::new()),
        }
    }

    pub fn with_json_encoder(mut self, encoder: Arc<dyn JsonEncoder>) -> Self {
        self.json = Codec::Json(JsonRpcCodec::with_encoder(encoder));
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcedureRegistry {
        &self.registry
    }

    pub fn register(&mut self, method: Method) -> Result<&ProcedureDescriptor, RegistryError> {
        self.registry.register(method, None, None, None)
    }

    pub fn register_with(
        &mut self,
        method: Method,
        name: Option<&str>,
        signature: Option<&[String]>,
        doc: Option<&str>,
    ) -> Result<&ProcedureDescriptor, RegistryError> {
        self.registry.register(method, name, signature, doc)
    }

    pub fn json_dispatch(&self, body: &[u8], context: &CallContext) -> String {
        self.json.dispatch(&self.registry, body, context).body
    }

    pub fn xml_dispatch(&self, body: &[u8], context: &CallContext) -> String {
        self.xml.dispatch(&self.registry, body, context).body
    }

    pub fn method_name(&self, body: &[u8], protocol: Protocol) -> Option<String> {
        match protocol {
            Protocol::JsonRpc => serde_json::from_slice::<Value>(body)
                .ok()?
                .get("method")?
                .as_str()
                .map(str::to_string),
            Protocol::XmlRpc => xmlrpc::decode_call(body).ok().map(|call| call.method_name),
        }
    }

    fn codec(&self, protocol: Protocol) -> &Codec {
        match protocol {
            Protocol::JsonRpc => &self.json,
            Protocol::XmlRpc => &self.xml,
        }
    }

    fn is_restricted(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::JsonRpc => self.config.restrict_jsonrpc,
            Protocol::XmlRpc => self.config.restrict_xmlrpc,
        }
    }

    /// Only disabled protocols and denied permissions are errors; everything
    /// else is answered in the response body.
    pub fn handle(
        &self,
        request: &RpcRequest<'_>,
        checker: &dyn PermissionChecker,
    ) -> Result<RpcResponse, DispatchError> {
        let protocol = protocol::detect(
            request.content_type,
            request.body,
            self.config.log_requests_responses,
        );
        if self.is_restricted(protocol) {
            warn!(protocol = %protocol, "request for disabled protocol");
            return Err(DispatchError::ProtocolDisabled(protocol));
        }

        if self.config.log_requests_responses {
            logging::log_body(protocol, "request", request.body);
        }

        let method = self.method_name(request.body, protocol);
        auth::require_permission(
            &self.registry,
            method.as_deref(),
            request.context.caller.as_ref(),
            checker,
        )?;

        let started_at = Instant::now();
        let dispatched = self
            .codec(protocol)
            .dispatch(&self.registry, request.body, &request.context);
        logging::audit_call(
            protocol,
            dispatched.method.as_deref(),
            dispatched.succeeded,
            started_at.elapsed(),
        );

        if self.config.log_requests_responses {
            logging::log_body(protocol, "response", dispatched.body.as_bytes());
        }

        Ok(RpcResponse {
            protocol,
            content_type: protocol.content_type(),
            body: dispatched.body,
        })
    }
}

impl Default for RpcDispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}
