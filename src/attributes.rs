// 🚗 Attribute Data Model - AttributeRecord + MetadataEntry
// Identity is (category, title). Metadata rides along but never takes part in equality.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ATTRIBUTE CATEGORY
// ============================================================================

/// Closed set of vehicle attribute categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeCategory {
    Engine,
    Transmission,
    Drive,
    BodyStyle,
    Grade,
    Package,
    InteriorColor,
    ExteriorColor,
    Accessory,
    Option,
    Other,
}

impl AttributeCategory {
    pub const ALL: [AttributeCategory; 11] = [
        AttributeCategory::Engine,
        AttributeCategory::Transmission,
        AttributeCategory::Drive,
        AttributeCategory::BodyStyle,
        AttributeCategory::Grade,
        AttributeCategory::Package,
        AttributeCategory::InteriorColor,
        AttributeCategory::ExteriorColor,
        AttributeCategory::Accessory,
        AttributeCategory::Option,
        AttributeCategory::Other,
    ];

    /// Human-readable name for display
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeCategory::Engine => "Engine",
            AttributeCategory::Transmission => "Transmission",
            AttributeCategory::Drive => "Drive",
            AttributeCategory::BodyStyle => "Body Style",
            AttributeCategory::Grade => "Grade",
            AttributeCategory::Package => "Package",
            AttributeCategory::InteriorColor => "Interior Color",
            AttributeCategory::ExteriorColor => "Exterior Color",
            AttributeCategory::Accessory => "Accessory",
            AttributeCategory::Option => "Option",
            AttributeCategory::Other => "Other",
        }
    }

    /// Storage code (same spelling serde uses)
    pub fn code(&self) -> &'static str {
        match self {
            AttributeCategory::Engine => "ENGINE",
            AttributeCategory::Transmission => "TRANSMISSION",
            AttributeCategory::Drive => "DRIVE",
            AttributeCategory::BodyStyle => "BODY_STYLE",
            AttributeCategory::Grade => "GRADE",
            AttributeCategory::Package => "PACKAGE",
            AttributeCategory::InteriorColor => "INTERIOR_COLOR",
            AttributeCategory::ExteriorColor => "EXTERIOR_COLOR",
            AttributeCategory::Accessory => "ACCESSORY",
            AttributeCategory::Option => "OPTION",
            AttributeCategory::Other => "OTHER",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl fmt::Display for AttributeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeCategory {
    type Err = String;

    /// Accepts either the storage code ("BODY_STYLE") or the label ("Body Style")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
            .or_else(|| Self::ALL.iter().copied().find(|c| c.as_str() == s))
            .ok_or_else(|| format!("Unknown attribute category: {}", s))
    }
}

// ============================================================================
// METADATA TYPE / UNIT
// ============================================================================

/// Namespaced metadata types: COMMON_*, ENGINE_*, BODY_STYLE_*, ACCESSORY_*
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataType {
    // Common
    CommonMsrp,
    CommonBaseMsrp,
    CommonCategory,
    // Engine
    EngineCylinders,
    EngineFuelType,
    EngineHorsepower,
    EngineTorque,
    EngineDisplacement,
    // Body Style
    BodyStyleBed,
    BodyStyleCab,
    BodyStyleSeating,
    // Accessory
    AccessoryCategory,
}

impl MetadataType {
    pub fn label(&self) -> &'static str {
        match self {
            MetadataType::CommonMsrp => "MSRP",
            MetadataType::CommonBaseMsrp => "Base MSRP",
            MetadataType::CommonCategory => "Category",
            MetadataType::EngineCylinders => "Cylinders",
            MetadataType::EngineFuelType => "Fuel Type",
            MetadataType::EngineHorsepower => "Horsepower",
            MetadataType::EngineTorque => "Torque",
            MetadataType::EngineDisplacement => "Displacement",
            MetadataType::BodyStyleBed => "Bed",
            MetadataType::BodyStyleCab => "Cab",
            MetadataType::BodyStyleSeating => "Seating",
            MetadataType::AccessoryCategory => "Category",
        }
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataUnit {
    Dollars,
    Horsepower,
    Passengers,
}

impl MetadataUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            MetadataUnit::Dollars => "$",
            MetadataUnit::Horsepower => "hp",
            MetadataUnit::Passengers => "passengers",
        }
    }
}

/// Fuel types recorded as ENGINE_FUEL_TYPE text values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuelType {
    Gasoline,
    Diesel,
    Electric,
    Hybrid,
    FuelCell,
    PlugInHybrid,
}

impl FuelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuelType::Gasoline => "Gasoline",
            FuelType::Diesel => "Diesel",
            FuelType::Electric => "Electric",
            FuelType::Hybrid => "Hybrid",
            FuelType::FuelCell => "Fuel Cell",
            FuelType::PlugInHybrid => "Plug-in Hybrid",
        }
    }

    /// Manufacturer fuel labels ("Gas", "Battery Electric", ...); `None` when unknown
    pub fn from_text(text: &str) -> Option<FuelType> {
        match text.trim().to_ascii_lowercase().as_str() {
            "gas" | "gasoline" => Some(FuelType::Gasoline),
            "diesel" => Some(FuelType::Diesel),
            "electric" | "battery electric" => Some(FuelType::Electric),
            "hybrid" => Some(FuelType::Hybrid),
            "fuel cell" => Some(FuelType::FuelCell),
            "plug-in hybrid" | "plug in hybrid" => Some(FuelType::PlugInHybrid),
            _ => None,
        }
    }
}

// ============================================================================
// METADATA VALUE / ENTRY
// ============================================================================

/// Primitive metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Text(String),
}

impl MetadataValue {
    /// Numeric view used by price comparisons
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Decimal(d) => write!(f, "{}", d),
            MetadataValue::Boolean(b) => write!(f, "{}", b),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Decimal(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Boolean(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<FuelType> for MetadataValue {
    fn from(value: FuelType) -> Self {
        MetadataValue::Text(value.as_str().to_string())
    }
}

/// Typed annotation on an attribute. Equality compares the full tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    pub metadata_type: MetadataType,
    pub value: Option<MetadataValue>,
    #[serde(default)]
    pub unit: Option<MetadataUnit>,
}

impl MetadataEntry {
    pub fn new(metadata_type: MetadataType, value: impl Into<MetadataValue>) -> Self {
        MetadataEntry {
            metadata_type,
            value: Some(value.into()),
            unit: None,
        }
    }

    /// Entry whose value is explicitly null
    pub fn null(metadata_type: MetadataType) -> Self {
        MetadataEntry {
            metadata_type,
            value: None,
            unit: None,
        }
    }

    /// Shorthand for a whole-dollar price
    pub fn dollars(metadata_type: MetadataType, amount: i64) -> Self {
        MetadataEntry::new(metadata_type, amount).with_unit(MetadataUnit::Dollars)
    }

    /// Builder: attach a unit
    pub fn with_unit(mut self, unit: MetadataUnit) -> Self {
        self.unit = Some(unit);
        self
    }
}

impl fmt::Display for MetadataEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, &self.unit) {
            (Some(value), Some(MetadataUnit::Dollars)) => {
                write!(f, "{}={}{}", self.metadata_type, MetadataUnit::Dollars.symbol(), value)
            }
            (Some(value), Some(unit)) => write!(f, "{}={} {}", self.metadata_type, value, unit.symbol()),
            (Some(value), None) => write!(f, "{}={}", self.metadata_type, value),
            (None, _) => write!(f, "{}=null", self.metadata_type),
        }
    }
}

// ============================================================================
// ATTRIBUTE RECORD
// ============================================================================

/// Identity part of an AttributeRecord
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeKey {
    pub category: AttributeCategory,
    pub title: String,
}

/// One vehicle attribute occurrence.
///
/// Two records are the same attribute iff `category` and `title` match. Metadata,
/// storage ids and timestamps are carried but ignored by `==` and `Hash`; use
/// [`AttributeRecord::strict_eq`] to compare everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRecord {
    category: AttributeCategory,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Vec<MetadataEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribute_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl AttributeRecord {
    pub fn new(category: AttributeCategory, title: impl Into<String>) -> Self {
        AttributeRecord {
            category,
            title: title.into(),
            metadata: None,
            attribute_id: None,
            model_id: None,
            updated_at: None,
        }
    }

    /// Builder: replace metadata wholesale (an empty list is stored as absent)
    pub fn with_metadata(mut self, metadata: Vec<MetadataEntry>) -> Self {
        self.metadata = if metadata.is_empty() { None } else { Some(metadata) };
        self
    }

    /// Builder: same as `with_metadata` but keeps `None` as is
    pub fn with_optional_metadata(self, metadata: Option<Vec<MetadataEntry>>) -> Self {
        match metadata {
            Some(entries) => self.with_metadata(entries),
            None => self.without_metadata(),
        }
    }

    /// Builder: append one entry
    pub fn with_entry(mut self, entry: MetadataEntry) -> Self {
        self.metadata.get_or_insert_with(Vec::new).push(entry);
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.metadata = None;
        self
    }

    pub fn with_attribute_id(mut self, attribute_id: Uuid) -> Self {
        self.attribute_id = Some(attribute_id);
        self
    }

    pub fn with_model_id(mut self, model_id: Uuid) -> Self {
        self.model_id = Some(model_id);
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn category(&self) -> AttributeCategory {
        self.category
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn metadata(&self) -> Option<&[MetadataEntry]> {
        self.metadata.as_deref()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn attribute_id(&self) -> Option<Uuid> {
        self.attribute_id
    }

    pub fn model_id(&self) -> Option<Uuid> {
        self.model_id
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// First value recorded for a metadata type
    pub fn metadata_value(&self, metadata_type: MetadataType) -> Option<&MetadataValue> {
        self.metadata
            .as_ref()?
            .iter()
            .find(|m| m.metadata_type == metadata_type)
            .and_then(|m| m.value.as_ref())
    }

    pub fn key(&self) -> AttributeKey {
        AttributeKey {
            category: self.category,
            title: self.title.clone(),
        }
    }

    /// Take the metadata out, leaving the identity behind
    pub fn split_metadata(mut self) -> (AttributeRecord, Option<Vec<MetadataEntry>>) {
        let metadata = self.metadata.take();
        (self, metadata)
    }

    /// Full comparison: identity, metadata (order-sensitive) and storage fields
    pub fn strict_eq(&self, other: &AttributeRecord) -> bool {
        self == other
            && self.metadata == other.metadata
            && self.attribute_id == other.attribute_id
            && self.model_id == other.model_id
            && self.updated_at == other.updated_at
    }
}

impl PartialEq for AttributeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.title == other.title
    }
}

impl Eq for AttributeRecord {}

impl Hash for AttributeRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.category.hash(state);
        self.title.hash(state);
    }
}

impl fmt::Display for AttributeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.title)?;
        if let Some(metadata) = &self.metadata {
            let parts: Vec<String> = metadata.iter().map(|m| m.to_string()).collect();
            write!(f, " [{}]", parts.join(", "))?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
