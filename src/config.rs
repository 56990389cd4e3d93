use std::env;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub service_url: String,
    pub restrict_introspection: bool,
    pub restrict_jsonrpc: bool,
    pub restrict_xmlrpc: bool,
    pub log_requests_responses: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a boolean (true/false, 1/0, yes/no, on/off)")]
    InvalidFlag { name: &'static str },
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            restrict_introspection: false,
            restrict_jsonrpc: false,
            restrict_xmlrpc: false,
            log_requests_responses: true,
        }
    }
}

impl DispatcherConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |name: &'static str, default: bool| -> Result<bool, ConfigError> {
            lookup(name)
                .map(|value| value.trim().to_ascii_lowercase())
                .filter(|value| !value.is_empty())
                .map(|value| match value.as_str() {
                    "1" | "true" | "yes" | "on" => Ok(true),
                    "0" | "false" | "no" | "off" => Ok(false),
                    _ => Err(ConfigError::InvalidFlag { name }),
                })
                .transpose()
                .map(|value| value.unwrap_or(default))
        };

        Ok(Self {
            service_url: lookup("RPC_SERVICE_URL")
                .map(|url| url.trim().to_string())
                .unwrap_or(defaults.service_url),
            restrict_introspection: flag(
                "RPC_RESTRICT_INTROSPECTION",
                defaults.restrict_introspection,
            )?,
            restrict_jsonrpc: flag("RPC_RESTRICT_JSONRPC", defaults.restrict_jsonrpc)?,
            restrict_xmlrpc: flag("RPC_RESTRICT_XMLRPC", defaults.restrict_xmlrpc)?,
            log_requests_responses: flag(
                "RPC_LOG_REQUESTS_RESPONSES",
                defaults.log_requests_responses,
            )?,
        })
    }
}
