//! Entity-set and singleton model definitions.

use crate::edmx::{Edmx, NavigationProperty};
use crate::error::EdmError;
use crate::source::{ResolvedEntityType, SchemaSource};
use crate::types::{FieldType, collection_item, resolve_type};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Suffix of the writable stand-in for a client-assigned key.
pub const SHADOW_KEY_SUFFIX: &str = "ID";

/// Operations a singleton does not support.
pub const SINGLETON_DISABLED_ACTIONS: [&str; 4] = ["findByID", "findAll", "count", "distinct"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    /// Target model of a navigation property (pluralized entity-type name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// The wire key of a model: its real name and resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowKey {
    pub primarykey: String,
}

/// Exactly one of the two fields is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Store-generated key, addressed directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primarykey: Option<String>,
    /// Client-assigned key, written through a shadow field
    #[serde(rename = "appc.odata", default, skip_serializing_if = "Option::is_none")]
    pub appc_odata: Option<ShadowKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Entity-set (or singleton) name, also the URL segment
    pub name: String,
    pub connector: String,
    /// Fully-qualified entity type
    pub entity_type: String,
    pub key: KeyInfo,
    /// Never contains the key itself; may contain its shadow field
    pub fields: IndexMap<String, FieldDefinition>,
    pub metadata: ModelMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    #[serde(rename = "disabledActions", default, skip_serializing_if = "Option::is_none")]
    pub disabled_actions: Option<Vec<String>>,
}

impl ModelDefinition {
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.key.name
    }

    /// Name of the shadow key field, when the key is client-assigned.
    #[must_use]
    pub fn shadow_key(&self) -> Option<&str> {
        self.metadata
            .appc_odata
            .as_ref()
            .map(|shadow| shadow.primarykey.as_str())
    }

    #[must_use]
    pub fn is_ref_field(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|f| f.model.is_some())
    }

    /// Navigation fields with their target model names.
    pub fn ref_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|(name, f)| f.model.as_deref().map(|model| (name.as_str(), model)))
    }

    #[must_use]
    pub fn has_ref_fields(&self) -> bool {
        self.ref_fields().next().is_some()
    }

    /// Non-navigation fields, in declaration order.
    pub fn main_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.model.is_none())
            .map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn ref_model(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|f| f.model.as_deref())
    }

    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.actions.is_some()
    }

    /// Whether a CRUD operation (`findAll`, `count`, ...) is allowed.
    #[must_use]
    pub fn allows(&self, action: &str) -> bool {
        !self
            .disabled_actions
            .as_ref()
            .is_some_and(|disabled| disabled.iter().any(|a| a == action))
    }
}

/// Pluralized short name of the entity type behind `type_name`.
#[must_use]
pub fn related_model_name(type_name: &str) -> String {
    let item = collection_item(type_name).unwrap_or(type_name);
    let short = item.rsplit('.').next().unwrap_or(item);
    pluralizer::pluralize(short, 2, false)
}

/// Builds one model per entity set and singleton of every container.
///
/// # Errors
/// Fails on the first entity type that is undeclared, has a cyclic
/// `BaseType` chain or no key anywhere in it, and on a shadow key or
/// navigation property whose name is already taken by another field.
pub fn models_from_metadata(
    connector: &str,
    edmx: &Edmx,
) -> Result<IndexMap<String, ModelDefinition>, EdmError> {
    let source = SchemaSource::normalize(edmx);
    let mut models = IndexMap::new();

    for container in source.sources().flat_map(|s| s.entity_containers.iter()) {
        let sets = container
            .entity_sets
            .iter()
            .map(|set| (set.name.as_str(), set.entity_type.as_str(), false));
        let singletons = container
            .singletons
            .iter()
            .map(|single| (single.name.as_str(), single.r#type.as_str(), true));

        for (name, entity_type, singleton) in sets.chain(singletons) {
            let model = build_model(&source, connector, name, entity_type, singleton)?;
            if models.insert(name.to_owned(), model).is_some() {
                tracing::warn!(model = name, "duplicate entity set name; later definition wins");
            }
        }
    }

    tracing::debug!(count = models.len(), "generated models from metadata");
    Ok(models)
}

fn build_model(
    source: &SchemaSource<'_>,
    connector: &str,
    name: &str,
    entity_type: &str,
    singleton: bool,
) -> Result<ModelDefinition, EdmError> {
    let entity = source.resolve_entity_type(entity_type)?;
    let missing_key = || EdmError::MissingKey {
        entity_type: entity.name.clone(),
        model: name.to_owned(),
    };
    let key_name = entity.key.ok_or_else(missing_key)?;
    let key_prop = entity.key_property().ok_or_else(missing_key)?;

    let mut fields: IndexMap<String, FieldDefinition> = entity
        .properties
        .iter()
        .filter(|p| p.name != key_name)
        .map(|p| {
            let field = FieldDefinition {
                field_type: resolve_type(source, &p.r#type, false),
                required: p.nullable == Some(false),
                model: None,
            };
            (p.name.clone(), field)
        })
        .collect();

    let key = KeyInfo {
        name: key_name.to_owned(),
        field_type: resolve_type(source, &key_prop.r#type, false),
    };

    let collision = |field: &str| EdmError::FieldCollision {
        model: name.to_owned(),
        field: field.to_owned(),
    };

    let metadata = if key_prop.store_generated_pattern.is_some() {
        ModelMetadata {
            primarykey: Some(key.name.clone()),
            appc_odata: None,
        }
    } else {
        let shadow = format!("{key_name}{SHADOW_KEY_SUFFIX}");
        if fields.contains_key(&shadow) {
            return Err(collision(&shadow));
        }
        fields.insert(
            shadow.clone(),
            FieldDefinition {
                field_type: key.field_type,
                required: false,
                model: None,
            },
        );
        ModelMetadata {
            primarykey: None,
            appc_odata: Some(ShadowKey { primarykey: shadow }),
        }
    };

    for nav in &entity.navigation_properties {
        if let Some(field) = navigation_field(source, &entity, nav)
            && fields.insert(nav.name.clone(), field).is_some()
        {
            return Err(collision(&nav.name));
        }
    }

    let (actions, disabled_actions) = if singleton {
        (
            Some(vec!["read".to_owned()]),
            Some(SINGLETON_DISABLED_ACTIONS.map(str::to_owned).to_vec()),
        )
    } else {
        (None, None)
    };

    Ok(ModelDefinition {
        name: name.to_owned(),
        connector: connector.to_owned(),
        entity_type: entity.name.clone(),
        key,
        fields,
        metadata,
        actions,
        disabled_actions,
    })
}

/// v4 navigation properties name their target type; older ones go
/// through the first end of their association.
fn navigation_field(
    source: &SchemaSource<'_>,
    owner: &ResolvedEntityType<'_>,
    nav: &NavigationProperty,
) -> Option<FieldDefinition> {
    let target = nav.r#type.clone().or_else(|| {
        let relationship = nav.relationship.as_deref()?;
        source
            .association(relationship)
            .and_then(|assoc| assoc.ends.first())
            .map(|end| end.r#type.clone())
    });
    let Some(target) = target else {
        tracing::warn!(
            entity_type = %owner.name,
            field = %nav.name,
            "navigation property has no resolvable target; skipped"
        );
        return None;
    };

    Some(FieldDefinition {
        field_type: resolve_type(source, &target, true),
        required: false,
        model: Some(related_model_name(&target)),
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::edmx::parse_metadata;

    const XML: &str = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="Demo" xmlns:annotation="http://schemas.microsoft.com/ado/2009/02/edm/annotation">
      <EntityType Name="Product">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false" annotation:StoreGeneratedPattern="Identity"/>
        <Property Name="Name" Type="Edm.String" Nullable="false"/>
        <Property Name="Price" Type="Edm.Decimal"/>
        <NavigationProperty Name="Category" Type="Demo.Category"/>
      </EntityType>
      <EntityType Name="Category">
        <Key><PropertyRef Name="Code"/></Key>
        <Property Name="Code" Type="Edm.String" Nullable="false"/>
        <NavigationProperty Name="Products" Type="Collection(Demo.Product)"/>
      </EntityType>
      <EntityType Name="Keyless">
        <Property Name="Value" Type="Edm.String"/>
      </EntityType>
      <EntityContainer Name="Container">
        <EntitySet Name="Products" EntityType="Demo.Product"/>
        <EntitySet Name="Categories" EntityType="Demo.Category"/>
        <Singleton Name="Featured" Type="Demo.Product"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn test_store_generated_key() {
        let edmx = parse_metadata(XML).unwrap();
        let models = models_from_metadata("odata", &edmx).unwrap();
        let products = &models["Products"];

        assert_eq!(products.metadata.primarykey.as_deref(), Some("ID"));
        assert!(products.shadow_key().is_none());
        assert!(!products.fields.contains_key("ID"));
        assert!(!products.fields.contains_key("IDID"));
        assert!(products.fields["Name"].required);
        assert!(!products.fields["Price"].required);
        assert_eq!(products.fields["Price"].field_type, FieldType::Number);
        assert_eq!(products.key.field_type, FieldType::Number);
    }

    #[test]
    fn test_client_assigned_key_gets_shadow_field() {
        let edmx = parse_metadata(XML).unwrap();
        let models = models_from_metadata("odata", &edmx).unwrap();
        let categories = &models["Categories"];

        assert_eq!(categories.shadow_key(), Some("CodeID"));
        assert!(categories.metadata.primarykey.is_none());
        assert!(!categories.fields.contains_key("Code"));
        assert_eq!(
            categories.fields["CodeID"],
            FieldDefinition {
                field_type: FieldType::String,
                required: false,
                model: None
            }
        );
        assert_eq!(categories.primary_key(), "Code");
    }

    #[test]
    fn test_navigation_fields() {
        let edmx = parse_metadata(XML).unwrap();
        let models = models_from_metadata("odata", &edmx).unwrap();

        let category = &models["Products"].fields["Category"];
        assert_eq!(category.field_type, FieldType::String);
        assert_eq!(category.model.as_deref(), Some("Categories"));
        assert!(!category.required);

        let products = &models["Categories"].fields["Products"];
        assert_eq!(products.field_type, FieldType::Array);
        assert_eq!(products.model.as_deref(), Some("Products"));

        let refs: Vec<_> = models["Products"].ref_fields().collect();
        assert_eq!(refs, [("Category", "Categories")]);
        let main: Vec<_> = models["Products"].main_fields().collect();
        assert_eq!(main, ["Name", "Price"]);
    }

    #[test]
    fn test_singleton_restrictions() {
        let edmx = parse_metadata(XML).unwrap();
        let models = models_from_metadata("odata", &edmx).unwrap();
        let featured = &models["Featured"];

        assert!(featured.is_singleton());
        assert_eq!(featured.actions.as_deref(), Some(&["read".to_owned()][..]));
        assert!(!featured.allows("findAll"));
        assert!(featured.allows("read"));
        assert!(models["Products"].allows("findAll"));
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let xml = XML.replace(
            r#"<Singleton Name="Featured" Type="Demo.Product"/>"#,
            r#"<EntitySet Name="Keyless" EntityType="Demo.Keyless"/>"#,
        );
        let edmx = parse_metadata(&xml).unwrap();
        let err = models_from_metadata("odata", &edmx).unwrap_err();
        assert!(matches!(
            err,
            EdmError::MissingKey { ref entity_type, ref model }
                if entity_type == "Demo.Keyless" && model == "Keyless"
        ));
    }

    #[test]
    fn test_shadow_key_never_replaces_a_declared_property() {
        let xml = XML.replace(
            r#"<Property Name="Code" Type="Edm.String" Nullable="false"/>"#,
            r#"<Property Name="Code" Type="Edm.String" Nullable="false"/>
        <Property Name="CodeID" Type="Edm.Int32" Nullable="false"/>"#,
        );
        let edmx = parse_metadata(&xml).unwrap();
        let err = models_from_metadata("odata", &edmx).unwrap_err();
        assert!(matches!(
            err,
            EdmError::FieldCollision { ref model, ref field }
                if model == "Categories" && field == "CodeID"
        ));
    }

    #[test]
    fn test_navigation_property_named_like_the_shadow_key() {
        let xml = XML.replace(
            r#"<NavigationProperty Name="Products" Type="Collection(Demo.Product)"/>"#,
            r#"<NavigationProperty Name="CodeID" Type="Demo.Product"/>"#,
        );
        let edmx = parse_metadata(&xml).unwrap();
        let err = models_from_metadata("odata", &edmx).unwrap_err();
        assert!(matches!(err, EdmError::FieldCollision { ref field, .. } if field == "CodeID"));
    }

    #[test]
    fn test_serialized_shape() {
        let edmx = parse_metadata(XML).unwrap();
        let models = models_from_metadata("odata", &edmx).unwrap();
        let json = serde_json::to_value(&models["Categories"]).unwrap();

        assert_eq!(json["metadata"]["appc.odata"]["primarykey"], "CodeID");
        assert!(json["metadata"].get("primarykey").is_none());
        assert_eq!(json["fields"]["Products"]["model"], "Products");
        assert_eq!(json["fields"]["Products"]["type"], "array");
        assert!(json.get("disabledActions").is_none());
    }

    #[test]
    fn test_related_model_name() {
        assert_eq!(related_model_name("Ns.Person"), "People");
        assert_eq!(related_model_name("Collection(Ns.Trip)"), "Trips");
        assert_eq!(related_model_name("Category"), "Categories");
    }
}
