//! Mutations against the remote entity store

use async_trait::async_trait;

use crate::error::Result;

/// Attribute flavours that can be created automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Boolean,
    BigInt,
    Integer,
    Decimal { precision: u32, scale: u32 },
    Double,
    Money,
    DateTime,
    DateOnly,
    Memo { max_length: u32 },
    String { max_length: u32 },
}

impl AttributeKind {
    /// Dataverse metadata type name, e.g. `StringAttributeMetadata`
    pub fn metadata_type(&self) -> &'static str {
        match self {
            AttributeKind::Boolean => "BooleanAttributeMetadata",
            AttributeKind::BigInt => "BigIntAttributeMetadata",
            AttributeKind::Integer => "IntegerAttributeMetadata",
            AttributeKind::Decimal { .. } => "DecimalAttributeMetadata",
            AttributeKind::Double => "DoubleAttributeMetadata",
            AttributeKind::Money => "MoneyAttributeMetadata",
            AttributeKind::DateTime | AttributeKind::DateOnly => "DateTimeAttributeMetadata",
            AttributeKind::Memo { .. } => "MemoAttributeMetadata",
            AttributeKind::String { .. } => "StringAttributeMetadata",
        }
    }
}

/// A custom attribute to create
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttribute {
    pub logical_name: String,
    pub schema_name: String,
    pub display_name: String,
    pub required: bool,
    pub kind: AttributeKind,
}

/// An alternate key to create
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlternateKey {
    pub logical_name: String,
    pub schema_name: String,
    pub display_name: String,
    pub key_attributes: Vec<String>,
}

/// Remote mutations issued by the applier.
///
/// Each call is independent; implementations do not batch or roll back.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create_attribute(&self, entity: &str, attribute: &NewAttribute) -> Result<()>;

    async fn create_alternate_key(&self, entity: &str, key: &NewAlternateKey) -> Result<()>;

    async fn delete_attribute(&self, entity: &str, logical_name: &str) -> Result<()>;

    async fn delete_relationship(&self, schema_name: &str) -> Result<()>;

    async fn delete_alternate_key(&self, entity: &str, logical_name: &str) -> Result<()>;

    /// Export an unmanaged solution, returning the zip archive bytes
    async fn export_solution(&self, solution_name: &str) -> Result<Vec<u8>>;
}
