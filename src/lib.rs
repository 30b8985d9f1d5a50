// Vehicle Catalog - Core Library
// Attribute reconciliation, brand transformers, conversion registry and storage

pub mod attributes;
pub mod brands;
pub mod config;
pub mod converter;
pub mod db;
pub mod error;
pub mod parser;
pub mod reconciliation;
pub mod service;
pub mod transformer;

// Re-export commonly used types
pub use attributes::{
    AttributeCategory, AttributeKey, AttributeRecord, FuelType,
    MetadataEntry, MetadataType, MetadataUnit, MetadataValue,
};
pub use brands::{default_transformers, gm_transformer, toyota_transformer};
pub use config::{AppConfig, ConfigArgs};
pub use converter::{
    Converter, PersistedAttribute, RawDataRef, RawDataRow, Registration, TypeTag, ValueKind,
};
pub use db::{
    get_attributes_for_model, insert_brand, insert_model, insert_raw_data, open_database,
    setup_database, SharedConnection, SqliteDestination, SqliteRawDataSource,
};
pub use error::{FieldError, Result, TransformError};
pub use parser::{AttributeParser, ParseContext};
pub use reconciliation::{AttributeSet, FillMissing, MetadataUpdater, PriceUpdater};
pub use service::{
    Destination, FetchedRawData, MemoryDestination, MemoryRawDataSource, RawDataSource,
    TransformSummary, TransformerService,
};
pub use transformer::{
    BrandTransformer, Diagnostic, DiagnosticKind, Severity, TransformOutput, Transformer,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
