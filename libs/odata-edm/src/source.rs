//! Per-namespace indices over a parsed document.

use crate::edmx::{
    Association, ComplexType, Edmx, EntityContainer, EntityType, EnumType, Function,
    NavigationProperty, Property,
};
use crate::error::EdmError;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Definitions of one `<Schema>`, keyed by fully-qualified name (`Namespace.Name`).
#[derive(Debug)]
pub struct NormalizedSource<'a> {
    pub namespace: &'a str,
    pub alias: Option<&'a str>,
    pub entity_types: IndexMap<String, &'a EntityType>,
    pub complex_types: IndexMap<String, &'a ComplexType>,
    pub enum_types: IndexMap<String, &'a EnumType>,
    pub associations: IndexMap<String, &'a Association>,
    pub functions: IndexMap<String, &'a Function>,
    pub actions: IndexMap<String, &'a Function>,
    pub entity_containers: Vec<&'a EntityContainer>,
}

fn index_by_name<'a, T>(
    namespace: &str,
    items: &'a [T],
    name: impl Fn(&T) -> &str,
) -> IndexMap<String, &'a T> {
    items
        .iter()
        .map(|item| (format!("{namespace}.{}", name(item)), item))
        .collect()
}

impl<'a> NormalizedSource<'a> {
    fn from_schema(schema: &'a crate::edmx::Schema) -> Self {
        let ns = schema.namespace.as_str();
        Self {
            namespace: ns,
            alias: schema.alias.as_deref(),
            entity_types: index_by_name(ns, &schema.entity_types, |t| &t.name),
            complex_types: index_by_name(ns, &schema.complex_types, |t| &t.name),
            enum_types: index_by_name(ns, &schema.enum_types, |t| &t.name),
            associations: index_by_name(ns, &schema.associations, |a| &a.name),
            functions: index_by_name(ns, &schema.functions, |f| &f.name),
            actions: index_by_name(ns, &schema.actions, |f| &f.name),
            entity_containers: schema.entity_containers.iter().collect(),
        }
    }

    /// Rewrites `Alias.Name` to `Namespace.Name`.
    fn unalias(&self, name: &str) -> Option<String> {
        let alias = self.alias?;
        let rest = name.strip_prefix(alias)?.strip_prefix('.')?;
        Some(format!("{}.{rest}", self.namespace))
    }
}

/// An entity type with its `BaseType` chain folded in.
#[derive(Debug, Clone)]
pub struct ResolvedEntityType<'a> {
    /// Fully-qualified name of the most derived type
    pub name: String,
    /// First key property found walking from the derived type upward
    pub key: Option<&'a str>,
    /// Base properties first; a derived property replaces a base one of the same name
    pub properties: Vec<&'a Property>,
    pub navigation_properties: Vec<&'a NavigationProperty>,
}

impl<'a> ResolvedEntityType<'a> {
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&'a Property> {
        self.properties.iter().copied().find(|p| p.name == name)
    }

    #[must_use]
    pub fn key_property(&self) -> Option<&'a Property> {
        self.key.and_then(|key| self.property(key))
    }

    /// Short (unqualified) type name.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// All schemas of a document, keyed by namespace.
#[derive(Debug)]
pub struct SchemaSource<'a> {
    sources: IndexMap<&'a str, NormalizedSource<'a>>,
}

impl<'a> SchemaSource<'a> {
    #[must_use]
    pub fn normalize(edmx: &'a Edmx) -> Self {
        let sources = edmx
            .data_services
            .schemas
            .iter()
            .map(|schema| (schema.namespace.as_str(), NormalizedSource::from_schema(schema)))
            .collect();
        Self { sources }
    }

    pub fn sources(&self) -> impl Iterator<Item = &NormalizedSource<'a>> {
        self.sources.values()
    }

    /// Looks `name` up in every namespace.
    ///
    /// Accepts `Namespace.Name`, `Alias.Name`, or a bare `Name`; the bare
    /// form matches the first namespace that declares it.
    fn lookup<T: ?Sized>(
        &self,
        name: &str,
        pick: impl for<'s> Fn(&'s NormalizedSource<'a>) -> &'s IndexMap<String, &'a T>,
    ) -> Option<&'a T> {
        for source in self.sources.values() {
            let map = pick(source);
            if let Some(found) = map.get(name) {
                return Some(*found);
            }
            if let Some(found) = source.unalias(name).and_then(|fq| map.get(&fq)) {
                return Some(*found);
            }
        }
        if name.contains('.') {
            return None;
        }
        self.sources.values().find_map(|source| {
            pick(source)
                .get(&format!("{}.{name}", source.namespace))
                .copied()
        })
    }

    /// Canonical `Namespace.Name` of an entity type, whichever form `name` used.
    #[must_use]
    pub fn entity_type_name(&self, name: &str) -> Option<String> {
        let target = self.entity_type(name)?;
        self.sources.values().find_map(|source| {
            source
                .entity_types
                .iter()
                .find(|(_, t)| std::ptr::eq(**t, target))
                .map(|(fq, _)| fq.clone())
        })
    }

    #[must_use]
    pub fn entity_type(&self, name: &str) -> Option<&'a EntityType> {
        self.lookup(name, |s| &s.entity_types)
    }

    #[must_use]
    pub fn complex_type(&self, name: &str) -> Option<&'a ComplexType> {
        self.lookup(name, |s| &s.complex_types)
    }

    #[must_use]
    pub fn enum_type(&self, name: &str) -> Option<&'a EnumType> {
        self.lookup(name, |s| &s.enum_types)
    }

    #[must_use]
    pub fn association(&self, name: &str) -> Option<&'a Association> {
        self.lookup(name, |s| &s.associations)
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&'a Function> {
        self.lookup(name, |s| &s.functions)
    }

    #[must_use]
    pub fn action(&self, name: &str) -> Option<&'a Function> {
        self.lookup(name, |s| &s.actions)
    }

    /// Folds the `BaseType` chain of `name` into one definition.
    ///
    /// # Errors
    /// `UnknownEntityType` if `name` or any ancestor is undeclared,
    /// `CyclicBaseType` if the chain loops.
    pub fn resolve_entity_type(&self, name: &str) -> Result<ResolvedEntityType<'a>, EdmError> {
        let canonical = self
            .entity_type_name(name)
            .ok_or_else(|| EdmError::UnknownEntityType(name.to_owned()))?;

        let mut chain: Vec<&'a EntityType> = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(canonical.clone());
        while let Some(type_name) = current.take() {
            let entity = self
                .entity_type(&type_name)
                .ok_or_else(|| EdmError::UnknownEntityType(type_name.clone()))?;
            if !seen.insert(std::ptr::from_ref(entity)) {
                return Err(EdmError::CyclicBaseType(type_name));
            }
            chain.push(entity);
            current.clone_from(&entity.base_type);
        }

        let key = chain.iter().copied().find_map(EntityType::key_name);

        let mut properties: IndexMap<&str, &'a Property> = IndexMap::new();
        let mut navigation: IndexMap<&str, &'a NavigationProperty> = IndexMap::new();
        for entity in chain.iter().rev().copied() {
            for prop in &entity.properties {
                properties.insert(&prop.name, prop);
            }
            for nav in &entity.navigation_properties {
                navigation.insert(&nav.name, nav);
            }
        }

        Ok(ResolvedEntityType {
            name: canonical,
            key,
            properties: properties.into_values().collect(),
            navigation_properties: navigation.into_values().collect(),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::edmx::parse_metadata;

    const XML: &str = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="Shop.Models" Alias="Self">
      <EntityType Name="Item">
        <Key><PropertyRef Name="Code"/></Key>
        <Property Name="Code" Type="Edm.String" Nullable="false"/>
        <Property Name="Label" Type="Edm.String"/>
      </EntityType>
      <EntityType Name="Book" BaseType="Self.Item">
        <Property Name="Label" Type="Edm.Int32"/>
        <Property Name="Isbn" Type="Edm.String"/>
      </EntityType>
      <EntityType Name="Loop" BaseType="Shop.Models.Loop"/>
      <EntityType Name="Orphan" BaseType="Shop.Models.Missing"/>
      <EnumType Name="Color"><Member Name="Red"/></EnumType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn test_lookup_forms() {
        let edmx = parse_metadata(XML).unwrap();
        let source = SchemaSource::normalize(&edmx);

        assert!(source.entity_type("Shop.Models.Item").is_some());
        assert!(source.entity_type("Self.Item").is_some());
        assert!(source.entity_type("Item").is_some());
        assert!(source.entity_type("Other.Item").is_none());
        assert!(source.enum_type("Color").is_some());
        assert_eq!(
            source.entity_type_name("Self.Book").as_deref(),
            Some("Shop.Models.Book")
        );
    }

    #[test]
    fn test_base_type_merge() {
        let edmx = parse_metadata(XML).unwrap();
        let source = SchemaSource::normalize(&edmx);
        let book = source.resolve_entity_type("Book").unwrap();

        assert_eq!(book.name, "Shop.Models.Book");
        assert_eq!(book.short_name(), "Book");
        assert_eq!(book.key, Some("Code"));
        let names: Vec<_> = book.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Code", "Label", "Isbn"]);
        assert_eq!(book.property("Label").unwrap().r#type, "Edm.Int32");
        assert_eq!(book.key_property().unwrap().r#type, "Edm.String");
    }

    #[test]
    fn test_base_type_errors() {
        let edmx = parse_metadata(XML).unwrap();
        let source = SchemaSource::normalize(&edmx);

        assert!(matches!(
            source.resolve_entity_type("Loop"),
            Err(EdmError::CyclicBaseType(_))
        ));
        assert!(matches!(
            source.resolve_entity_type("Orphan"),
            Err(EdmError::UnknownEntityType(name)) if name == "Shop.Models.Missing"
        ));
        assert!(matches!(
            source.resolve_entity_type("Nope"),
            Err(EdmError::UnknownEntityType(_))
        ));
    }
}
