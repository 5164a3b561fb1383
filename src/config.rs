//! Environment-driven configuration.
//!
//! All settings are read once at startup. Credentials have no baked-in
//! fallback: the server refuses to start when the API key, the MCP URL,
//! or the MCP token is missing or empty.

/// Variable holding the DeepSeek API key (required).
const ENV_API_KEY: &str = "DEEPSEEK_API_KEY";
/// Variable overriding the chat-completion API base URL.
const ENV_API_BASE: &str = "DEEPSEEK_API_BASE";
/// Variable overriding the model identifier.
const ENV_MODEL: &str = "DEEPSEEK_MODEL";
/// Variable holding the ezBookkeeping MCP base URL (required).
const ENV_MCP_URL: &str = "EZBOOKKEEPING_MCP_URL";
/// Variable holding the ezBookkeeping MCP bearer token (required).
const ENV_MCP_TOKEN: &str = "EZBOOKKEEPING_MCP_TOKEN";
/// Variable overriding the listen address.
const ENV_BIND_ADDR: &str = "LEDGERCHAT_ADDR";

/// Default chat-completion API base URL.
const DEFAULT_API_BASE: &str = "https://api.deepseek.com/v1";
/// Default model identifier.
const DEFAULT_MODEL: &str = "deepseek-chat";
/// Default listen address.
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Error raised when a required environment variable is missing or empty.
#[derive(Debug, thiserror::Error)]
#[error("environment variable {name} is required")]
pub(crate) struct MissingVar {
    /// Name of the offending variable.
    name: &'static str,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Chat-completion API base, e.g. `https://api.deepseek.com/v1`.
    pub(crate) api_base: String,
    /// Bearer token for the chat-completion API.
    pub(crate) api_key: String,
    /// Model identifier sent with every completion request.
    pub(crate) model: String,
    /// ezBookkeeping MCP base URL; tools are invoked at `{base}/call`.
    pub(crate) mcp_url: String,
    /// Bearer token for the MCP endpoint.
    pub(crate) mcp_token: String,
    /// Address the HTTP server binds to.
    pub(crate) bind_addr: String,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first required variable that is
    /// missing or empty.
    pub(crate) fn from_env() -> Result<Self, MissingVar> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through an arbitrary variable lookup.
    ///
    /// Exists so tests can inject variables without touching the
    /// process environment (`std::env::set_var` is unsafe).
    ///
    /// # Errors
    ///
    /// Returns an error naming the first required variable that is
    /// missing or empty.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, MissingVar>
    where
        F: Fn(&str) -> Option<String>,
    {
        /// Fetches a required variable, rejecting empty values.
        fn required<F>(lookup: &F, name: &'static str) -> Result<String, MissingVar>
        where
            F: Fn(&str) -> Option<String>,
        {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(MissingVar { name })
        }

        Ok(Self {
            api_base: lookup(ENV_API_BASE).unwrap_or_else(|| DEFAULT_API_BASE.to_owned()),
            api_key: required(&lookup, ENV_API_KEY)?,
            model: lookup(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            mcp_url: required(&lookup, ENV_MCP_URL)?,
            mcp_token: required(&lookup, ENV_MCP_TOKEN)?,
            bind_addr: lookup(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned()),
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use std::collections::HashMap;

    use super::Config;

    fn vars(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|&(name, value)| (name.to_owned(), value.to_owned()))
            .collect()
    }

    fn full_vars() -> HashMap<String, String> {
        vars(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("EZBOOKKEEPING_MCP_URL", "http://localhost:8422/mcp"),
            ("EZBOOKKEEPING_MCP_TOKEN", "token"),
        ])
    }

    #[test]
    fn required_vars_present() {
        let env = full_vars();
        let config = Config::from_lookup(|name| env.get(name).cloned())
            .expect("should build from required vars");
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.mcp_url, "http://localhost:8422/mcp");
        assert_eq!(config.mcp_token, "token");
    }

    #[test]
    fn defaults_apply() {
        let env = full_vars();
        let config = Config::from_lookup(|name| env.get(name).cloned())
            .expect("should build from required vars");
        assert_eq!(config.api_base, "https://api.deepseek.com/v1");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.bind_addr, "127.0.0.1:8000");
    }

    #[test]
    fn overrides_apply() {
        let mut env = full_vars();
        let _base = env.insert("DEEPSEEK_API_BASE".to_owned(), "http://llm.local/v1".to_owned());
        let _model = env.insert("DEEPSEEK_MODEL".to_owned(), "deepseek-reasoner".to_owned());
        let _addr = env.insert("LEDGERCHAT_ADDR".to_owned(), "0.0.0.0:9000".to_owned());
        let config = Config::from_lookup(|name| env.get(name).cloned())
            .expect("should build with overrides");
        assert_eq!(config.api_base, "http://llm.local/v1");
        assert_eq!(config.model, "deepseek-reasoner");
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
    }

    #[test]
    fn missing_api_key_fails() {
        let mut env = full_vars();
        let _removed = env.remove("DEEPSEEK_API_KEY");
        let err = Config::from_lookup(|name| env.get(name).cloned())
            .expect_err("should fail without API key");
        assert!(err.to_string().contains("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn empty_token_rejected() {
        let mut env = full_vars();
        let _previous = env.insert("EZBOOKKEEPING_MCP_TOKEN".to_owned(), String::new());
        let err = Config::from_lookup(|name| env.get(name).cloned())
            .expect_err("should fail on empty token");
        assert!(err.to_string().contains("EZBOOKKEEPING_MCP_TOKEN"));
    }
}
