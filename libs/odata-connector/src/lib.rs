#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Data access over an `OData` v4 service.
//!
//! [`Connector::connect`] reads the service's `$metadata`, generates one
//! [`ModelDefinition`](odata_edm::ModelDefinition) per entity set and
//! singleton plus one [`EndpointDescriptor`](odata_edm::EndpointDescriptor)
//! per function or action import, and hands out [`EntitySetClient`]s that
//! translate CRUD calls and abstract queries into `OData` requests.
//!
//! ```no_run
//! # async fn run() -> Result<(), odata_connector::ConnectorError> {
//! use odata_connector::{Connector, ConnectorConfig, QueryOptions};
//! use serde_json::json;
//!
//! let config = ConnectorConfig::for_url("https://services.odata.org/TripPinRESTierService/")?;
//! let connector = Connector::connect(config).await?;
//!
//! let people = connector.entity_set("People")?;
//! let options = QueryOptions::from_value(json!({
//!     "where": {"FirstName": {"$like": "Scott"}},
//!     "order": {"LastName": -1},
//!     "limit": 10
//! }))?;
//! for row in people.query(options).await? {
//!     println!("{}", row["UserName"]);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connector;
mod error;
pub mod filter;
mod keys;
mod metadata;
mod methods;
mod options;
mod refs;
mod registry;

pub use client::{EntitySetClient, Row};
pub use config::{ConnectorConfig, ENV_PREFIX};
pub use connector::Connector;
pub use error::ConnectorError;
pub use filter::LikeStyle;
pub use keys::{key_literal, key_of, normalize_key};
pub use metadata::fetch_metadata;
pub use options::{DEFAULT_MAX_LIMIT, Paging, QueryOptions};
pub use refs::RefDiff;
pub use registry::ModelRegistry;
