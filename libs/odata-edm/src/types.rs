use crate::source::SchemaSource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The adapter's field type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
}

impl FieldType {
    /// Maps an EDM primitive. Anything unrecognised is a string.
    #[must_use]
    pub fn from_primitive(edm_type: &str) -> Self {
        match edm_type {
            "Edm.Boolean" => Self::Boolean,
            "Edm.Single" | "Edm.SByte" | "Edm.Int64" | "Edm.Int32" | "Edm.Int16" | "Edm.Guid"
            | "Edm.Double" | "Edm.Decimal" | "Edm.Byte" | "Edm.Binary" => Self::Number,
            "Edm.DateTime" | "Edm.Time" | "Edm.DateTimeOffset" => Self::Date,
            _ => Self::String,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inner type of `Collection(X)`, or `None` for a single-valued type.
#[must_use]
pub fn collection_item(type_name: &str) -> Option<&str> {
    type_name
        .strip_prefix("Collection(")
        .and_then(|rest| rest.strip_suffix(')'))
        .filter(|inner| !inner.is_empty())
}

/// Resolves a declared type name to a [`FieldType`].
///
/// Entity types (and every type when `is_foreign` is set) resolve to the
/// type of the referenced entity's key, since a reference is stored as
/// that key. Never fails: an unresolvable reference is a string.
#[must_use]
pub fn resolve_type(source: &SchemaSource<'_>, type_name: &str, is_foreign: bool) -> FieldType {
    if collection_item(type_name).is_some() {
        return FieldType::Array;
    }
    if is_foreign || source.entity_type(type_name).is_some() {
        return match source.resolve_entity_type(type_name) {
            Ok(entity) => entity
                .key_property()
                .map_or(FieldType::String, |key| FieldType::from_primitive(&key.r#type)),
            Err(err) => {
                tracing::warn!(type_name, error = %err, "unresolved reference type; using string");
                FieldType::String
            }
        };
    }
    if source.enum_type(type_name).is_some() {
        return FieldType::String;
    }
    if source.complex_type(type_name).is_some() {
        return FieldType::Object;
    }
    FieldType::from_primitive(type_name)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::edmx::parse_metadata;

    #[test]
    fn test_primitive_table() {
        assert_eq!(FieldType::from_primitive("Edm.Boolean"), FieldType::Boolean);
        for number in ["Edm.Int32", "Edm.Int64", "Edm.Guid", "Edm.Decimal", "Edm.Binary"] {
            assert_eq!(FieldType::from_primitive(number), FieldType::Number, "{number}");
        }
        assert_eq!(FieldType::from_primitive("Edm.DateTimeOffset"), FieldType::Date);
        assert_eq!(FieldType::from_primitive("Edm.Duration"), FieldType::String);
        assert_eq!(FieldType::from_primitive("Edm.GeographyPoint"), FieldType::String);
    }

    #[test]
    fn test_collection_item() {
        assert_eq!(collection_item("Collection(Edm.String)"), Some("Edm.String"));
        assert_eq!(collection_item("Collection()"), None);
        assert_eq!(collection_item("Edm.String"), None);
    }

    #[test]
    fn test_resolve_against_schema() {
        let xml = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="Ns">
      <EntityType Name="Trip">
        <Key><PropertyRef Name="TripId"/></Key>
        <Property Name="TripId" Type="Edm.Int32" Nullable="false"/>
      </EntityType>
      <ComplexType Name="Location"><Property Name="Address" Type="Edm.String"/></ComplexType>
      <EnumType Name="Gender"><Member Name="Male"/></EnumType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;
        let edmx = parse_metadata(xml).unwrap();
        let source = SchemaSource::normalize(&edmx);

        assert_eq!(resolve_type(&source, "Collection(Ns.Trip)", true), FieldType::Array);
        assert_eq!(resolve_type(&source, "Ns.Trip", false), FieldType::Number);
        assert_eq!(resolve_type(&source, "Ns.Gender", false), FieldType::String);
        assert_eq!(resolve_type(&source, "Ns.Location", false), FieldType::Object);
        assert_eq!(resolve_type(&source, "Edm.Double", false), FieldType::Number);
        assert_eq!(resolve_type(&source, "Ns.Missing", true), FieldType::String);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&FieldType::Date).unwrap(), "\"date\"");
        assert_eq!(FieldType::Array.to_string(), "array");
    }
}
