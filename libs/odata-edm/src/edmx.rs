//! Serde view of an EDMX `$metadata` document.
//!
//! Only the parts the transformers read are modelled; everything else
//! (annotations, terms, type definitions) is skipped by serde. Repeated
//! elements are always `Vec`s, so a schema with a single `EntityType`
//! reads the same as one with many.

use crate::error::EdmError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Edmx {
    #[serde(rename = "@Version")]
    pub version: Option<String>,
    #[serde(rename = "DataServices")]
    pub data_services: DataServices,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataServices {
    #[serde(rename = "Schema", default)]
    pub schemas: Vec<Schema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Schema {
    #[serde(rename = "@Namespace")]
    pub namespace: String,
    #[serde(rename = "@Alias")]
    pub alias: Option<String>,
    #[serde(rename = "EntityType", default)]
    pub entity_types: Vec<EntityType>,
    #[serde(rename = "ComplexType", default)]
    pub complex_types: Vec<ComplexType>,
    #[serde(rename = "EnumType", default)]
    pub enum_types: Vec<EnumType>,
    #[serde(rename = "Association", default)]
    pub associations: Vec<Association>,
    #[serde(rename = "Function", default)]
    pub functions: Vec<Function>,
    #[serde(rename = "Action", default)]
    pub actions: Vec<Function>,
    #[serde(rename = "EntityContainer", default)]
    pub entity_containers: Vec<EntityContainer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityType {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@BaseType")]
    pub base_type: Option<String>,
    #[serde(rename = "Key")]
    pub key: Option<Key>,
    #[serde(rename = "Property", default)]
    pub properties: Vec<Property>,
    #[serde(rename = "NavigationProperty", default)]
    pub navigation_properties: Vec<NavigationProperty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Key {
    #[serde(rename = "PropertyRef", default)]
    pub property_refs: Vec<PropertyRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyRef {
    #[serde(rename = "@Name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Property {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Type")]
    pub r#type: String,
    #[serde(rename = "@Nullable")]
    pub nullable: Option<bool>,
    /// Present (usually as `annotation:StoreGeneratedPattern`) when the
    /// service assigns the value itself.
    #[serde(rename = "@StoreGeneratedPattern")]
    pub store_generated_pattern: Option<String>,
}

/// v4 documents carry `Type`; v3-style ones point at an `Association`.
#[derive(Debug, Clone, Deserialize)]
pub struct NavigationProperty {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Type")]
    pub r#type: Option<String>,
    #[serde(rename = "@Relationship")]
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComplexType {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@BaseType")]
    pub base_type: Option<String>,
    #[serde(rename = "Property", default)]
    pub properties: Vec<Property>,
}

/// Only the name matters: enum values travel as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct EnumType {
    #[serde(rename = "@Name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Association {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "End", default)]
    pub ends: Vec<AssociationEnd>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationEnd {
    #[serde(rename = "@Type")]
    pub r#type: String,
}

/// Shared shape of `<Function>` and `<Action>`.
#[derive(Debug, Clone, Deserialize)]
pub struct Function {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "Parameter", default)]
    pub parameters: Vec<Parameter>,
    #[serde(rename = "ReturnType")]
    pub return_type: Option<ReturnType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Type")]
    pub r#type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReturnType {
    #[serde(rename = "@Type")]
    pub r#type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityContainer {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "EntitySet", default)]
    pub entity_sets: Vec<EntitySet>,
    #[serde(rename = "Singleton", default)]
    pub singletons: Vec<Singleton>,
    #[serde(rename = "FunctionImport", default)]
    pub function_imports: Vec<FunctionImport>,
    #[serde(rename = "ActionImport", default)]
    pub action_imports: Vec<ActionImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitySet {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@EntityType")]
    pub entity_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Singleton {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Type")]
    pub r#type: String,
}

/// Older documents declare parameters and the return type on the import
/// itself instead of on a separate `<Function>`.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionImport {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Function")]
    pub function: Option<String>,
    #[serde(rename = "@EntitySet")]
    pub entity_set: Option<String>,
    #[serde(rename = "@ReturnType")]
    pub return_type: Option<String>,
    #[serde(rename = "Parameter", default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionImport {
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "@Action")]
    pub action: Option<String>,
    #[serde(rename = "@EntitySet")]
    pub entity_set: Option<String>,
}

impl EntityType {
    /// First `PropertyRef` of the declared key, if this type declares one.
    #[must_use]
    pub fn key_name(&self) -> Option<&str> {
        self.key
            .as_ref()
            .and_then(|k| k.property_refs.first())
            .map(|r| r.name.as_str())
    }
}

/// Parses a `$metadata` document.
///
/// # Errors
/// `EdmError::Xml` on malformed XML, `EdmError::InvalidDocument` when the
/// document declares no `Schema`.
pub fn parse_metadata(xml: &str) -> Result<Edmx, EdmError> {
    let edmx: Edmx = quick_xml::de::from_str(xml)?;
    if edmx.data_services.schemas.is_empty() {
        return Err(EdmError::InvalidDocument(
            "DataServices contains no Schema".to_owned(),
        ));
    }
    tracing::debug!(
        version = edmx.version.as_deref().unwrap_or("?"),
        schemas = edmx.data_services.schemas.len(),
        "parsed EDMX document"
    );
    Ok(edmx)
}
