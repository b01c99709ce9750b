//! Client configuration and builder.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::executor::RetryPolicy;
use crate::specs::{ApiSpecs, PermissiveResolver, Resolver, StrictResolver};
use crate::transport::{AsyncTransport, BlockingReqwestTransport, ReqwestTransport, Transport};

/// Default API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.example.com/public/v1";

/// Default page size for searches.
pub const DEFAULT_LIMIT: usize = 100;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Header carrying the API key.
pub const AUTHORIZATION: &str = "Authorization";

const USER_AGENT: &str = "User-Agent";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Serializable client configuration.
///
/// ```
/// use rest_fluent::ClientConfig;
///
/// let config = ClientConfig::from_toml_str(r#"
///     api_key = "ApiKey SU-000:xxx"
///     max_retries = 3
///
///     [default_headers]
///     X-Request-Source = "billing"
/// "#).unwrap();
/// assert_eq!(config.max_retries, 3);
/// assert_eq!(config.default_limit, 100);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// API key sent as the `Authorization` header.
    pub api_key: String,
    /// Base URL every path is appended to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Use specs (when supplied) to resolve names.
    #[serde(default = "default_true")]
    pub use_specs: bool,
    /// Reject calls to operations the specs do not declare.
    #[serde(default = "default_true")]
    pub validate_using_specs: bool,
    /// Headers added to every request.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    /// Page size for searches.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Additional attempts for transient failures.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    #[serde(default)]
    pub retry_backoff_ms: u64,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overrides the default `User-Agent`.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ClientConfig {
    /// A configuration with every optional key at its default.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: default_endpoint(),
            use_specs: true,
            validate_using_specs: true,
            default_headers: BTreeMap::new(),
            default_limit: DEFAULT_LIMIT,
            max_retries: 0,
            retry_backoff_ms: 0,
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the construction rules.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("api_key is required".to_string()));
        }
        if self
            .default_headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case(AUTHORIZATION))
        {
            return Err(Error::Config(
                "default_headers cannot contain Authorization".to_string(),
            ));
        }
        if self.default_limit == 0 {
            return Err(Error::Config("default_limit must be positive".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }
        Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint `{}`: {}", self.endpoint, e)))?;
        Ok(())
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Resolved settings shared by every node and call of a client.
pub(crate) struct Settings {
    pub(crate) api_key: String,
    pub(crate) endpoint: String,
    pub(crate) user_agent: String,
    pub(crate) default_headers: Vec<(String, String)>,
    pub(crate) default_limit: usize,
    pub(crate) timeout: Duration,
    pub(crate) retry: RetryPolicy,
    /// Present only when requests must be validated against specs.
    pub(crate) validator: Option<Arc<dyn ApiSpecs>>,
    pub(crate) resolver: Arc<dyn Resolver>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("endpoint", &self.endpoint)
            .field("default_limit", &self.default_limit)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("validating", &self.validator.is_some())
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// Builder for both client flavours.
///
/// ```no_run
/// use rest_fluent::Client;
///
/// # fn example() -> rest_fluent::Result<()> {
/// let client = Client::builder()
///     .api_key("ApiKey SU-000:xxx")
///     .endpoint("https://api.example.com/public/v1")
///     .max_retries(2)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    specs: Option<Arc<dyn ApiSpecs>>,
    transport: Option<Arc<dyn AsyncTransport>>,
    blocking_transport: Option<Arc<dyn Transport>>,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self::from_config(ClientConfig::new(""))
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            specs: None,
            transport: None,
            blocking_transport: None,
            timeout: None,
        }
    }

    /// Set the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    /// Set the API endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Supply API specs.
    pub fn specs(mut self, specs: impl ApiSpecs + 'static) -> Self {
        self.specs = Some(Arc::new(specs));
        self
    }

    /// Supply shared API specs.
    pub fn shared_specs(mut self, specs: Arc<dyn ApiSpecs>) -> Self {
        self.specs = Some(specs);
        self
    }

    /// Enable or disable use of the supplied specs.
    pub fn use_specs(mut self, enabled: bool) -> Self {
        self.config.use_specs = enabled;
        self
    }

    /// Enable or disable request validation against the specs.
    pub fn validate_using_specs(mut self, enabled: bool) -> Self {
        self.config.validate_using_specs = enabled;
        self
    }

    /// Add a header sent with every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name.into(), value.into());
        self
    }

    /// Set the search page size.
    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Set how many extra attempts transient failures get.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the delay before the first retry.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the per-call timeout. Overrides `timeout_secs` from the config.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(agent.into());
        self
    }

    /// Use a custom transport for the async client.
    pub fn transport(mut self, transport: impl AsyncTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a custom transport for the blocking client.
    pub fn blocking_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.blocking_transport = Some(Arc::new(transport));
        self
    }

    pub(crate) fn settings(&self) -> Result<Settings> {
        let config = &self.config;
        config.validate()?;
        let timeout = self.timeout.unwrap_or_else(|| config.timeout());
        if timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".to_string()));
        }

        let specs = if config.use_specs {
            self.specs.clone()
        } else {
            None
        };
        let resolver: Arc<dyn Resolver> = match &specs {
            Some(specs) => Arc::new(StrictResolver::new(specs.clone())),
            None => Arc::new(PermissiveResolver),
        };
        let validator = specs.filter(|_| config.validate_using_specs);

        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("rest-fluent/{}", env!("CARGO_PKG_VERSION")));

        Ok(Settings {
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            user_agent,
            default_headers: config
                .default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            default_limit: config.default_limit,
            timeout,
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_backoff_ms),
            ),
            validator,
            resolver,
        })
    }

    /// Build the async client.
    pub fn build(self) -> Result<crate::Client> {
        let settings = self.settings()?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        Ok(crate::Client::from_parts(Arc::new(settings), transport))
    }

    /// Build the blocking client.
    pub fn build_blocking(self) -> Result<crate::blocking::Client> {
        let settings = self.settings()?;
        let transport = match self.blocking_transport {
            Some(transport) => transport,
            None => Arc::new(
                BlockingReqwestTransport::new()
                    .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?,
            ),
        };
        Ok(crate::blocking::Client::from_parts(
            Arc::new(settings),
            transport,
        ))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("specs", &self.specs.is_some())
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub(crate) fn auth_headers(&self) -> [(&'static str, &str); 2] {
        [
            (AUTHORIZATION, self.api_key.as_str()),
            (USER_AGENT, self.user_agent.as_str()),
        ]
    }
}
