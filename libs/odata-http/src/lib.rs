#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Outbound HTTP transport for talking to `OData` services.
//!
//! A hyper client wrapped in a small tower stack:
//! - rustls TLS (HTTPS only unless insecure HTTP is explicitly allowed)
//! - per-request timeout
//! - default headers (`User-Agent` plus configured service headers)
//! - transparent gzip/brotli/deflate decompression
//! - a bounded buffer that fails fast with [`HttpError::Overloaded`]
//!
//! Body reads are capped by `max_body_size`, measured on decompressed bytes.
//!
//! ```ignore
//! use odata_http::HttpClient;
//!
//! let client = HttpClient::builder()
//!     .timeout(std::time::Duration::from_secs(10))
//!     .default_header("odata-version", "4.0")
//!     .build()?;
//!
//! let xml = client
//!     .get("https://services.odata.org/TripPinRESTierService/$metadata")
//!     .send()
//!     .await?
//!     .text()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig, TransportSecurity};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse, ResponseBody};
