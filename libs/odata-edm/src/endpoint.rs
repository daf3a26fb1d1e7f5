//! Callable endpoint descriptors for function and action imports.

use crate::edmx::{Edmx, Function, Parameter};
use crate::source::SchemaSource;
use crate::types::{FieldType, collection_item, resolve_type};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_DESCRIPTION: &str = "oData auto-generated API";
pub const ENDPOINT_METHOD: &str = "GET";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointGroup {
    Functions,
    Actions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Import name
    pub name: String,
    pub group: EndpointGroup,
    /// `/api/<lowercase name>` followed by `/:param` per parameter
    pub path: String,
    pub method: String,
    pub description: String,
    /// Entity set the call returns rows of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<IndexMap<String, ParameterDefinition>>,
    /// Fully-qualified function/action name, or the import name when no
    /// definition is declared separately
    pub function: String,
    /// URL segment the call is dispatched to
    pub target: String,
    pub return_collection: bool,
    pub connector: String,
}

impl EndpointDescriptor {
    /// Declared parameter names, in path order.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .flat_map(IndexMap::keys)
            .map(String::as_str)
    }
}

/// What an import resolved to.
struct Definition<'a> {
    function: String,
    target: &'a str,
    parameters: &'a [Parameter],
    return_type: Option<&'a str>,
}

impl<'a> Definition<'a> {
    fn declared(fq_name: String, def: &'a Function) -> Self {
        Self {
            function: fq_name,
            target: &def.name,
            parameters: &def.parameters,
            return_type: def.return_type.as_ref().map(|r| r.r#type.as_str()),
        }
    }
}

/// Builds one descriptor per `FunctionImport` and `ActionImport` of every
/// container. Never fails: an import whose definition is not declared is
/// described from the import element itself.
#[must_use]
pub fn endpoints_from_metadata(connector: &str, edmx: &Edmx) -> Vec<EndpointDescriptor> {
    let source = SchemaSource::normalize(edmx);
    let mut endpoints = Vec::new();

    for normalized in source.sources() {
        for container in &normalized.entity_containers {
            for import in &container.function_imports {
                let reference = import.function.as_deref().unwrap_or(&import.name);
                let def = source.function(reference).map_or_else(
                    || Definition {
                        function: import.name.clone(),
                        target: &import.name,
                        parameters: &import.parameters,
                        return_type: import.return_type.as_deref(),
                    },
                    |def| Definition::declared(qualify(normalized.namespace, reference), def),
                );
                endpoints.push(describe(
                    &source,
                    connector,
                    &import.name,
                    EndpointGroup::Functions,
                    import.entity_set.as_deref(),
                    &def,
                ));
            }

            for import in &container.action_imports {
                let reference = import.action.as_deref().unwrap_or(&import.name);
                let def = source.action(reference).map_or_else(
                    || Definition {
                        function: import.name.clone(),
                        target: &import.name,
                        parameters: &[],
                        return_type: None,
                    },
                    |def| Definition::declared(qualify(normalized.namespace, reference), def),
                );
                endpoints.push(describe(
                    &source,
                    connector,
                    &import.name,
                    EndpointGroup::Actions,
                    import.entity_set.as_deref(),
                    &def,
                ));
            }
        }
    }

    tracing::debug!(count = endpoints.len(), "generated endpoints from metadata");
    endpoints
}

fn qualify(namespace: &str, name: &str) -> String {
    if name.contains('.') {
        name.to_owned()
    } else {
        format!("{namespace}.{name}")
    }
}

fn describe(
    source: &SchemaSource<'_>,
    connector: &str,
    name: &str,
    group: EndpointGroup,
    entity_set: Option<&str>,
    def: &Definition<'_>,
) -> EndpointDescriptor {
    let mut path = format!("/api/{}", name.to_lowercase());
    let parameters = (!def.parameters.is_empty()).then(|| {
        def.parameters
            .iter()
            .map(|param| {
                path.push_str("/:");
                path.push_str(&param.name);
                let definition = ParameterDefinition {
                    description: param.name.clone(),
                    param_type: resolve_type(source, &param.r#type, false),
                };
                (param.name.clone(), definition)
            })
            .collect()
    });

    EndpointDescriptor {
        name: name.to_owned(),
        group,
        path,
        method: ENDPOINT_METHOD.to_owned(),
        description: ENDPOINT_DESCRIPTION.to_owned(),
        model: entity_set.map(str::to_owned),
        parameters,
        function: def.function.clone(),
        target: def.target.to_owned(),
        return_collection: def.return_type.and_then(collection_item).is_some(),
        connector: connector.to_owned(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::edmx::parse_metadata;

    const XML: &str = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="Demo">
      <EntityType Name="Product">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
      </EntityType>
      <Function Name="ProductsAbove">
        <Parameter Name="price" Type="Edm.Decimal"/>
        <Parameter Name="label" Type="Edm.String"/>
        <ReturnType Type="Collection(Demo.Product)"/>
      </Function>
      <Function Name="TopProduct">
        <ReturnType Type="Demo.Product"/>
      </Function>
      <Action Name="Reset"/>
      <EntityContainer Name="Container">
        <EntitySet Name="Products" EntityType="Demo.Product"/>
        <FunctionImport Name="ProductsAbove" Function="Demo.ProductsAbove" EntitySet="Products"/>
        <FunctionImport Name="TopProduct" Function="Demo.TopProduct" EntitySet="Products"/>
        <FunctionImport Name="Legacy" ReturnType="Collection(Edm.String)">
          <Parameter Name="q" Type="Edm.String"/>
        </FunctionImport>
        <ActionImport Name="Reset" Action="Demo.Reset"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    fn endpoints() -> Vec<EndpointDescriptor> {
        let edmx = parse_metadata(XML).unwrap();
        endpoints_from_metadata("odata", &edmx)
    }

    #[test]
    fn test_function_with_parameters() {
        let all = endpoints();
        let ep = all.iter().find(|e| e.name == "ProductsAbove").unwrap();

        assert_eq!(ep.group, EndpointGroup::Functions);
        assert_eq!(ep.path, "/api/productsabove/:price/:label");
        assert_eq!(ep.method, "GET");
        assert_eq!(ep.description, ENDPOINT_DESCRIPTION);
        assert_eq!(ep.model.as_deref(), Some("Products"));
        assert_eq!(ep.function, "Demo.ProductsAbove");
        assert_eq!(ep.target, "ProductsAbove");
        assert!(ep.return_collection);

        let params = ep.parameters.as_ref().unwrap();
        assert_eq!(params["price"].param_type, FieldType::Number);
        assert_eq!(params["label"].description, "label");
        assert_eq!(ep.parameter_names().collect::<Vec<_>>(), ["price", "label"]);
    }

    #[test]
    fn test_single_return_and_no_parameters() {
        let all = endpoints();
        let ep = all.iter().find(|e| e.name == "TopProduct").unwrap();

        assert!(!ep.return_collection);
        assert!(ep.parameters.is_none());
        assert_eq!(ep.path, "/api/topproduct");
    }

    #[test]
    fn test_undeclared_function_falls_back_to_import() {
        let all = endpoints();
        let ep = all.iter().find(|e| e.name == "Legacy").unwrap();

        assert_eq!(ep.function, "Legacy");
        assert_eq!(ep.path, "/api/legacy/:q");
        assert!(ep.return_collection);
        assert!(ep.model.is_none());
    }

    #[test]
    fn test_actions_follow_functions() {
        let all = endpoints();
        let names: Vec<_> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["ProductsAbove", "TopProduct", "Legacy", "Reset"]);

        let reset = all.last().unwrap();
        assert_eq!(reset.group, EndpointGroup::Actions);
        assert_eq!(reset.function, "Demo.Reset");
        assert_eq!(reset.connector, "odata");
    }
}
