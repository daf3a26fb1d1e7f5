#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! `OData` `$metadata` to adapter schema.
//!
//! [`parse_metadata`] reads an EDMX document; [`models_from_metadata`] and
//! [`endpoints_from_metadata`] turn it into model definitions (one per
//! entity set or singleton) and callable endpoint descriptors (one per
//! function or action import). Everything here is pure: no I/O.
//!
//! ```
//! let xml = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
//!   <edmx:DataServices>
//!     <Schema Namespace="Demo">
//!       <EntityType Name="Tag">
//!         <Key><PropertyRef Name="Code"/></Key>
//!         <Property Name="Code" Type="Edm.String" Nullable="false"/>
//!       </EntityType>
//!       <EntityContainer Name="Container">
//!         <EntitySet Name="Tags" EntityType="Demo.Tag"/>
//!       </EntityContainer>
//!     </Schema>
//!   </edmx:DataServices>
//! </edmx:Edmx>"#;
//!
//! let edmx = odata_edm::parse_metadata(xml)?;
//! let models = odata_edm::models_from_metadata("odata", &edmx)?;
//! assert_eq!(models["Tags"].shadow_key(), Some("CodeID"));
//! # Ok::<(), odata_edm::EdmError>(())
//! ```

pub mod edmx;
mod endpoint;
mod error;
mod model;
mod source;
mod types;

pub use edmx::{Edmx, parse_metadata};
pub use endpoint::{
    ENDPOINT_DESCRIPTION, ENDPOINT_METHOD, EndpointDescriptor, EndpointGroup, ParameterDefinition,
    endpoints_from_metadata,
};
pub use error::EdmError;
pub use model::{
    FieldDefinition, KeyInfo, ModelDefinition, ModelMetadata, SHADOW_KEY_SUFFIX,
    SINGLETON_DISABLED_ACTIONS, ShadowKey, models_from_metadata, related_model_name,
};
pub use source::{NormalizedSource, ResolvedEntityType, SchemaSource};
pub use types::{FieldType, collection_item, resolve_type};
