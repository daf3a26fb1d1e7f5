use std::time::Duration;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("odata-adapter/", env!("CARGO_PKG_VERSION"));

/// Where TLS trust anchors come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Mozilla roots compiled into the binary
    #[default]
    WebPki,
    /// OS certificate store, loaded once per process
    Native,
}

/// Which URL schemes a client accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum TransportSecurity {
    #[default]
    TlsOnly,
    /// Plain `http://` is accepted too. Meant for local services and mock servers.
    AllowInsecureHttp,
}

/// Settings for [`crate::HttpClientBuilder`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Applies to each request individually
    pub request_timeout: Duration,

    /// Cap on decompressed response bytes
    pub max_body_size: usize,

    pub user_agent: String,

    /// Added to every request unless the request sets the same header
    pub default_headers: Vec<(String, String)>,

    pub transport: TransportSecurity,

    pub tls_roots: TlsRootConfig,

    /// Requests queued beyond this fail with `Overloaded`. Minimum 1.
    pub buffer_capacity: usize,

    /// `None` keeps idle connections forever
    pub pool_idle_timeout: Option<Duration>,

    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: Vec::new(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::WebPki,
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
        assert!(config.user_agent.starts_with("odata-adapter/"));
        assert!(config.default_headers.is_empty());
    }
}
