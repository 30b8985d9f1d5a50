// 🔀 Converter - tagged type-conversion registry
//
// Every convertible value carries a TypeTag. Lookups go:
//   1. exact table  (TypeTag, destination ValueKind)
//   2. family table (source ValueKind, destination ValueKind)
// so one registration can serve every attribute category at once.
// Built once at startup, read-only afterwards.

use crate::attributes::{AttributeCategory, AttributeRecord, MetadataEntry};
use crate::error::{Result, TransformError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// PERSISTED SHAPES
// ============================================================================

/// Flat storage row for one attribute; metadata is a JSON text blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAttribute {
    pub attribute_id: Option<Uuid>,
    pub category: AttributeCategory,
    pub title: String,
    pub model_id: Option<Uuid>,
    pub metadata: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Stored raw snapshot row (document kept as JSON text)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataRow {
    pub data_id: Uuid,
    pub model_id: Uuid,
    pub raw_data: String,
    pub created_at: DateTime<Utc>,
}

/// Reference to a raw snapshot as callers and collaborators pass it around
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataRef {
    pub data_id: Option<Uuid>,
    pub model_id: Option<Uuid>,
    pub raw_data: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RawDataRef {
    pub fn new(data_id: Uuid) -> Self {
        RawDataRef {
            data_id: Some(data_id),
            ..Default::default()
        }
    }

    /// Builder pattern: expected owning model
    pub fn with_model_id(mut self, model_id: Uuid) -> Self {
        self.model_id = Some(model_id);
        self
    }

    pub fn with_raw_data(mut self, raw_data: Value) -> Self {
        self.raw_data = Some(raw_data);
        self
    }
}

// ============================================================================
// TAGS
// ============================================================================

/// Destination side of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    AttributeRecord,
    PersistedAttribute,
    RawDataRow,
    RawDataRef,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::AttributeRecord => "AttributeRecord",
            ValueKind::PersistedAttribute => "PersistedAttribute",
            ValueKind::RawDataRow => "RawDataRow",
            ValueKind::RawDataRef => "RawDataRef",
        };
        f.write_str(name)
    }
}

/// Source side of a conversion: the kind plus, for attributes, the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Attribute(AttributeCategory),
    PersistedAttribute,
    RawDataRow,
    RawDataRef,
}

impl TypeTag {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypeTag::Attribute(_) => ValueKind::AttributeRecord,
            TypeTag::PersistedAttribute => ValueKind::PersistedAttribute,
            TypeTag::RawDataRow => ValueKind::RawDataRow,
            TypeTag::RawDataRef => ValueKind::RawDataRef,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Attribute(category) => write!(f, "AttributeRecord({})", category.code()),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Any value the registry can move between representations
#[derive(Debug, Clone)]
pub enum DomainValue {
    Attribute(AttributeRecord),
    PersistedAttribute(PersistedAttribute),
    RawDataRow(RawDataRow),
    RawDataRef(RawDataRef),
}

impl DomainValue {
    pub fn tag(&self) -> TypeTag {
        match self {
            DomainValue::Attribute(record) => TypeTag::Attribute(record.category()),
            DomainValue::PersistedAttribute(_) => TypeTag::PersistedAttribute,
            DomainValue::RawDataRow(_) => TypeTag::RawDataRow,
            DomainValue::RawDataRef(_) => TypeTag::RawDataRef,
        }
    }
}

/// Typed view over DomainValue
pub trait Convert: Sized {
    const KIND: ValueKind;

    fn into_domain(self) -> DomainValue;

    fn from_domain(value: DomainValue) -> Option<Self>;
}

impl Convert for AttributeRecord {
    const KIND: ValueKind = ValueKind::AttributeRecord;

    fn into_domain(self) -> DomainValue {
        DomainValue::Attribute(self)
    }

    fn from_domain(value: DomainValue) -> Option<Self> {
        match value {
            DomainValue::Attribute(record) => Some(record),
            _ => None,
        }
    }
}

impl Convert for PersistedAttribute {
    const KIND: ValueKind = ValueKind::PersistedAttribute;

    fn into_domain(self) -> DomainValue {
        DomainValue::PersistedAttribute(self)
    }

    fn from_domain(value: DomainValue) -> Option<Self> {
        match value {
            DomainValue::PersistedAttribute(row) => Some(row),
            _ => None,
        }
    }
}

impl Convert for RawDataRow {
    const KIND: ValueKind = ValueKind::RawDataRow;

    fn into_domain(self) -> DomainValue {
        DomainValue::RawDataRow(self)
    }

    fn from_domain(value: DomainValue) -> Option<Self> {
        match value {
            DomainValue::RawDataRow(row) => Some(row),
            _ => None,
        }
    }
}

impl Convert for RawDataRef {
    const KIND: ValueKind = ValueKind::RawDataRef;

    fn into_domain(self) -> DomainValue {
        DomainValue::RawDataRef(self)
    }

    fn from_domain(value: DomainValue) -> Option<Self> {
        match value {
            DomainValue::RawDataRef(reference) => Some(reference),
            _ => None,
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

type ConvertFn = Box<dyn Fn(DomainValue) -> Result<DomainValue> + Send + Sync>;

/// Where a conversion is filed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Only this exact source tag
    Exact(TypeTag),
    /// Every tag of the source kind
    Family,
}

#[derive(Default)]
pub struct Converter {
    exact: HashMap<(TypeTag, ValueKind), ConvertFn>,
    family: HashMap<(ValueKind, ValueKind), ConvertFn>,
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the attribute and raw-data conversions storage needs
    pub fn with_defaults() -> Result<Self> {
        let mut converter = Converter::new();
        converter.register(Registration::Family, attribute_to_persisted)?;
        converter.register(Registration::Exact(TypeTag::PersistedAttribute), persisted_to_attribute)?;
        converter.register(Registration::Exact(TypeTag::RawDataRow), raw_row_to_ref)?;
        Ok(converter)
    }

    /// Register `S -> D`. Re-registering the same slot warns and replaces.
    pub fn register<S, D, F>(&mut self, registration: Registration, convert: F) -> Result<()>
    where
        S: Convert + 'static,
        D: Convert + 'static,
        F: Fn(S) -> Result<D> + Send + Sync + 'static,
    {
        let wrapped: ConvertFn = Box::new(move |value: DomainValue| {
            let tag = value.tag();
            let source = S::from_domain(value).ok_or_else(|| {
                TransformError::InvalidArgument(format!("converter for {} received {}", S::KIND, tag))
            })?;
            convert(source).map(Convert::into_domain)
        });

        let replaced = match registration {
            Registration::Exact(tag) => {
                if tag.kind() != S::KIND {
                    return Err(TransformError::InvalidArgument(format!(
                        "tag {} does not belong to {}",
                        tag, S::KIND
                    )));
                }
                self.exact.insert((tag, D::KIND), wrapped).is_some()
            }
            Registration::Family => self.family.insert((S::KIND, D::KIND), wrapped).is_some(),
        };

        if replaced {
            warn!(source = %S::KIND, destination = %D::KIND, ?registration, "Replacing registered converter");
        }
        Ok(())
    }

    pub fn can_convert(&self, tag: TypeTag, destination: ValueKind) -> bool {
        self.lookup(tag, destination).is_some()
    }

    fn lookup(&self, tag: TypeTag, destination: ValueKind) -> Option<&ConvertFn> {
        self.exact
            .get(&(tag, destination))
            .or_else(|| self.family.get(&(tag.kind(), destination)))
    }

    /// Convert one value, exact match first, then family
    pub fn convert<S: Convert, D: Convert>(&self, source: S) -> Result<D> {
        let value = source.into_domain();
        let tag = value.tag();
        let convert = self.lookup(tag, D::KIND).ok_or(TransformError::NoConverter {
            input: tag,
            output: D::KIND,
        })?;

        let converted = convert(value)?;
        let produced = converted.tag();
        D::from_domain(converted).ok_or_else(|| {
            TransformError::InvalidArgument(format!("converter for {} produced {}", D::KIND, produced))
        })
    }

    /// Convert a batch; fails as a whole on the first error
    pub fn convert_all<S: Convert, D: Convert>(&self, sources: Vec<S>) -> Result<Vec<D>> {
        sources.into_iter().map(|s| self.convert(s)).collect()
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut exact: Vec<String> = self.exact.keys().map(|(s, d)| format!("{} -> {}", s, d)).collect();
        let mut family: Vec<String> = self.family.keys().map(|(s, d)| format!("{} -> {}", s, d)).collect();
        exact.sort();
        family.sort();
        f.debug_struct("Converter")
            .field("exact", &exact)
            .field("family", &family)
            .finish()
    }
}

// ============================================================================
// DEFAULT CONVERSIONS
// ============================================================================

pub fn attribute_to_persisted(record: AttributeRecord) -> Result<PersistedAttribute> {
    let metadata = record.metadata().map(serde_json::to_string).transpose()?;
    Ok(PersistedAttribute {
        attribute_id: record.attribute_id(),
        category: record.category(),
        title: record.title().to_string(),
        model_id: record.model_id(),
        metadata,
        updated_at: record.updated_at(),
    })
}

pub fn persisted_to_attribute(row: PersistedAttribute) -> Result<AttributeRecord> {
    let metadata = row
        .metadata
        .as_deref()
        .map(serde_json::from_str::<Vec<MetadataEntry>>)
        .transpose()?;

    let mut record = AttributeRecord::new(row.category, row.title).with_optional_metadata(metadata);
    if let Some(attribute_id) = row.attribute_id {
        record = record.with_attribute_id(attribute_id);
    }
    if let Some(model_id) = row.model_id {
        record = record.with_model_id(model_id);
    }
    if let Some(updated_at) = row.updated_at {
        record = record.with_updated_at(updated_at);
    }
    Ok(record)
}

pub fn raw_row_to_ref(row: RawDataRow) -> Result<RawDataRef> {
    let raw_data: Value = serde_json::from_str(&row.raw_data)?;
    Ok(RawDataRef {
        data_id: Some(row.data_id),
        model_id: Some(row.model_id),
        raw_data: Some(raw_data),
        created_at: Some(row.created_at),
    })
}

// ============================================================================
// TESTS
// ============================================================================
