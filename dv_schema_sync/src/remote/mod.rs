//! Remote entity store boundary
//!
//! Everything that talks to Dataverse lives here: the metadata model, the
//! collaborator traits and the Web API transport implementing them.

pub mod connection;
pub mod metadata;
pub mod source;
pub mod store;
pub mod webapi;

pub use connection::ConnectionSettings;
pub use metadata::{
    AlternateKey, AttributeMetadata, EntityMetadata, MetadataResult, MetadataSnapshot,
    RelationshipMetadata,
};
pub use source::{MetadataSource, SnapshotFileSource};
pub use store::{AttributeKind, EntityStore, NewAlternateKey, NewAttribute};
pub use webapi::WebApiClient;
