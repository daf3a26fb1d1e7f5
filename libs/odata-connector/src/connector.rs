//! Connector lifecycle: metadata discovery, model generation and client
//! hand-out.

use crate::client::{EntitySetClient, Session};
use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::filter::literal;
use crate::metadata::fetch_metadata;
use crate::registry::ModelRegistry;
use odata_edm::{
    Edmx, EndpointDescriptor, FieldType, ModelDefinition, endpoints_from_metadata,
    models_from_metadata, parse_metadata,
};
use odata_http::{HttpClient, HttpClientBuilder};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A connected `OData` service.
///
/// Cheap to clone; clones share the HTTP pool and the generated registry.
#[derive(Clone)]
pub struct Connector {
    config: Arc<ConnectorConfig>,
    session: Arc<Session>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("config", &self.config)
            .field("models", &self.session.registry.models().len())
            .field("endpoints", &self.session.registry.endpoints().len())
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Fetches `$metadata` and generates models and endpoints from it.
    ///
    /// # Errors
    /// `Metadata` when the document cannot be fetched or parsed, `Schema`
    /// when an entity type cannot be turned into a model.
    pub async fn connect(config: ConnectorConfig) -> Result<Self, ConnectorError> {
        let http = build_http(&config)?;
        let edmx = fetch_metadata(&http, &config.metadata_url()).await?;
        Self::assemble(config, http, &edmx)
    }

    /// Builds a connector from a metadata document already at hand.
    ///
    /// No request is made, but the HTTP client is created, so this must
    /// run inside a Tokio runtime.
    ///
    /// # Errors
    /// `Schema` on an unparseable or inconsistent document.
    pub fn from_metadata(config: ConnectorConfig, xml: &str) -> Result<Self, ConnectorError> {
        Self::from_parts(config, &parse_metadata(xml)?)
    }

    /// [`from_metadata`](Self::from_metadata) for an already-parsed document.
    ///
    /// # Errors
    /// `Schema` when an entity type cannot be turned into a model.
    pub fn from_parts(config: ConnectorConfig, edmx: &Edmx) -> Result<Self, ConnectorError> {
        let http = build_http(&config)?;
        Self::assemble(config, http, edmx)
    }

    fn assemble(
        config: ConnectorConfig,
        http: HttpClient,
        edmx: &Edmx,
    ) -> Result<Self, ConnectorError> {
        let models = models_from_metadata(&config.name, edmx)?;
        let endpoints = endpoints_from_metadata(&config.name, edmx);
        tracing::info!(
            connector = %config.name,
            url = %config.url,
            models = models.len(),
            endpoints = endpoints.len(),
            "OData connector ready"
        );

        let session = Session {
            http,
            url: config.url.clone(),
            registry: ModelRegistry::new(models, endpoints),
            like_style: config.like_style,
            max_limit: config.max_limit,
        };
        Ok(Self {
            config: Arc::new(config),
            session: Arc::new(session),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.session.registry
    }

    #[must_use]
    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.session.registry.model(name)
    }

    /// Client for a registered entity set or singleton.
    ///
    /// # Errors
    /// `UnknownModel` when `name` was not generated from the metadata.
    pub fn entity_set(&self, name: &str) -> Result<EntitySetClient, ConnectorError> {
        if self.session.registry.model(name).is_none() {
            return Err(ConnectorError::UnknownModel(name.to_owned()));
        }
        Ok(EntitySetClient::new(Arc::clone(&self.session), name))
    }

    /// Client addressing `{url}{name}` without a registered model, for
    /// sets or functions the metadata does not describe.
    #[must_use]
    pub fn raw_set(&self, name: &str) -> EntitySetClient {
        EntitySetClient::new(Arc::clone(&self.session), name)
    }

    /// Calls a generated endpoint. `args` are matched to the declared
    /// parameters by name; string arguments to numeric, boolean or date
    /// parameters are sent unquoted.
    ///
    /// An endpoint declared to return a collection always yields an array;
    /// an empty response is an empty array.
    ///
    /// # Errors
    /// `UnknownEndpoint`, `Validation` for missing, unknown or mistyped
    /// arguments, `Payload` when a collection endpoint answers with
    /// something else, otherwise the request failure.
    pub async fn invoke(
        &self,
        endpoint: &str,
        args: &Map<String, Value>,
    ) -> Result<Option<Value>, ConnectorError> {
        let descriptor = self
            .session
            .registry
            .endpoint(endpoint)
            .ok_or_else(|| ConnectorError::UnknownEndpoint(endpoint.to_owned()))?;
        let rendered = render_args(descriptor, args)?;
        tracing::debug!(endpoint, target = %descriptor.target, args = rendered.len(), "invoking endpoint");
        let result = self.raw_set(&descriptor.target).call(&rendered).await?;
        if !descriptor.return_collection {
            return Ok(result);
        }
        match result {
            None => Ok(Some(Value::Array(Vec::new()))),
            Some(items @ Value::Array(_)) => Ok(Some(items)),
            Some(_) => Err(ConnectorError::Payload(format!(
                "'{}' returns a collection but the response is not an array",
                descriptor.name
            ))),
        }
    }
}

fn build_http(config: &ConnectorConfig) -> Result<HttpClient, ConnectorError> {
    Ok(HttpClientBuilder::with_config(config.http_client_config()).build()?)
}

/// Orders `args` by the declared parameters and renders each as a URL
/// literal.
fn render_args(
    descriptor: &EndpointDescriptor,
    args: &Map<String, Value>,
) -> Result<Vec<(String, String)>, ConnectorError> {
    if let Some(unknown) = args
        .keys()
        .find(|name| descriptor.parameter_names().all(|p| p != name.as_str()))
    {
        return Err(ConnectorError::validation(format!(
            "'{}' has no parameter '{unknown}'",
            descriptor.name
        )));
    }

    let Some(parameters) = &descriptor.parameters else {
        return Ok(Vec::new());
    };
    parameters
        .iter()
        .map(|(name, param)| {
            let value = args.get(name).ok_or_else(|| {
                ConnectorError::validation(format!(
                    "missing parameter '{name}' for '{}'",
                    descriptor.name
                ))
            })?;
            Ok((name.clone(), render_arg(name, param.param_type, value)?))
        })
        .collect()
}

fn render_arg(name: &str, param_type: FieldType, value: &Value) -> Result<String, ConnectorError> {
    let Value::String(text) = value else {
        return Ok(literal(value));
    };
    let text = text.trim();
    match param_type {
        FieldType::Number => text
            .parse::<serde_json::Number>()
            .map(|n| n.to_string())
            .map_err(|_| ConnectorError::validation(format!("parameter '{name}' must be a number"))),
        FieldType::Boolean => text
            .parse::<bool>()
            .map(|b| b.to_string())
            .map_err(|_| ConnectorError::validation(format!("parameter '{name}' must be true or false"))),
        FieldType::Date => Ok(text.to_owned()),
        FieldType::String | FieldType::Object | FieldType::Array => Ok(literal(value)),
    }
}
