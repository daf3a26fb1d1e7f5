use indexmap::IndexMap;
use odata_edm::{EndpointDescriptor, ModelDefinition};

/// Models and endpoints generated at connect time. Immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelDefinition>,
    endpoints: Vec<EndpointDescriptor>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new(
        models: IndexMap<String, ModelDefinition>,
        endpoints: Vec<EndpointDescriptor>,
    ) -> Self {
        Self { models, endpoints }
    }

    #[must_use]
    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.get(name)
    }

    #[must_use]
    pub fn models(&self) -> &IndexMap<String, ModelDefinition> {
        &self.models
    }

    #[must_use]
    pub fn endpoint(&self, name: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    #[must_use]
    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }
}
