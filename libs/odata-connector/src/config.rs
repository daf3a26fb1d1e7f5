//! Connector configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional YAML
//! file, `ODATA_*` environment variables (`__` separates nested keys, so
//! `ODATA_HEADERS__AUTHORIZATION` sets `headers.authorization`), then
//! whatever the caller merges on top of [`ConnectorConfig::figment`].

use crate::error::ConnectorError;
use crate::filter::LikeStyle;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use indexmap::IndexMap;
use odata_http::{DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig, TransportSecurity};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "ODATA_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Connector handle recorded on generated models and endpoints
    pub name: String,

    /// Service root. Required; normalized to end with `/`.
    pub url: String,

    /// Per-request timeout
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    pub user_agent: String,

    /// Sent with every request (static authentication goes here)
    pub headers: IndexMap<String, String>,

    pub allow_insecure_http: bool,

    /// Trust the OS certificate store instead of the bundled Mozilla roots
    pub native_roots: bool,

    pub max_body_size: usize,

    pub like_style: LikeStyle,

    /// Upper bound accepted for the `limit` query option
    pub max_limit: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            name: "odata".to_owned(),
            url: String::new(),
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: IndexMap::new(),
            allow_insecure_http: false,
            native_roots: false,
            max_body_size: 10 * 1024 * 1024,
            like_style: LikeStyle::default(),
            max_limit: 1000,
        }
    }
}

impl ConnectorConfig {
    /// Config pointing at `url`, everything else default.
    ///
    /// # Errors
    /// `Config` when `url` is not an absolute http(s) URL.
    pub fn for_url(url: &str) -> Result<Self, ConnectorError> {
        Self {
            url: url.to_owned(),
            ..Self::default()
        }
        .normalized()
    }

    /// Defaults, then `path` (if any), then the environment.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// # Errors
    /// `Config` on a malformed layer or a missing/invalid `url`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConnectorError> {
        Self::from_figment(&Self::figment(path))
    }

    /// # Errors
    /// `Config` on a malformed layer or a missing/invalid `url`.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConnectorError> {
        let config: Self = figment.extract()?;
        config.normalized()
    }

    fn normalized(mut self) -> Result<Self, ConnectorError> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(ConnectorError::Config("url is required".to_owned()));
        }
        let parsed = url::Url::parse(raw)
            .map_err(|e| ConnectorError::Config(format!("invalid url '{raw}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConnectorError::Config(format!(
                "url '{raw}' must use http or https"
            )));
        }
        if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
            return Err(ConnectorError::Config(format!("url '{raw}' has no host")));
        }

        let mut url = raw.to_owned();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.url = url;
        Ok(self)
    }

    /// `{url}$metadata`
    #[must_use]
    pub fn metadata_url(&self) -> String {
        format!("{}$metadata", self.url)
    }

    #[must_use]
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: self.timeout,
            max_body_size: self.max_body_size,
            user_agent: self.user_agent.clone(),
            default_headers: self
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            transport: if self.allow_insecure_http {
                TransportSecurity::AllowInsecureHttp
            } else {
                TransportSecurity::TlsOnly
            },
            tls_roots: if self.native_roots {
                TlsRootConfig::Native
            } else {
                TlsRootConfig::WebPki
            },
            ..HttpClientConfig::default()
        }
    }
}

/// `Duration` as a humantime string (`30s`, `1m 30s`).
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}
