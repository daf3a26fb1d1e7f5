use thiserror::Error;

/// Schema load failures. All of them are fatal: no partial model set is produced.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EdmError {
    #[error("failed to parse EDMX document: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("invalid EDMX document: {0}")]
    InvalidDocument(String),

    #[error("entity type '{0}' is not declared in any schema")]
    UnknownEntityType(String),

    #[error("can't find primary key for entity type '{entity_type}' (required by '{model}')")]
    MissingKey { entity_type: String, model: String },

    #[error("cyclic BaseType chain at entity type '{0}'")]
    CyclicBaseType(String),

    /// A generated field (shadow key or navigation property) would replace
    /// a field already declared on the model.
    #[error("field '{field}' of model '{model}' is declared twice")]
    FieldCollision { model: String, field: String },
}
