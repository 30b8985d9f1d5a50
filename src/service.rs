// 🧭 TransformerService - validate, fetch, transform, persist
//
// One call processes one stored raw snapshot:
//   1. the reference must carry a data id
//   2. the canonical snapshot is re-fetched; its owning model must match the caller's
//   3. the brand's Transformer runs over the fetched document
//   4. the records go to the Destination together with the canonical reference
// Nothing is handed to the Destination unless every earlier step succeeded.

use crate::attributes::AttributeRecord;
use crate::converter::RawDataRef;
use crate::error::{Result, TransformError};
use crate::transformer::{Diagnostic, DiagnosticKind, Transformer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Canonical snapshot plus the brand that owns its model
#[derive(Debug, Clone)]
pub struct FetchedRawData {
    pub raw_data: RawDataRef,
    pub brand_name: String,
}

/// Where raw snapshots are read from
pub trait RawDataSource: Send + Sync {
    fn fetch_raw_data(&self, data_id: Uuid) -> Result<FetchedRawData>;
}

/// Where transformed attributes go.
///
/// Implementations replace all stored attributes of the model in one step and
/// fail with `AlreadyExists` when attributes exist and overwriting is off.
pub trait Destination: Send + Sync {
    fn accept(&self, records: Vec<AttributeRecord>, raw_data: &RawDataRef) -> Result<()>;
}

// ============================================================================
// SERVICE
// ============================================================================

/// Outcome of one successful transform call
#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    pub data_id: Uuid,
    pub model_id: Uuid,
    pub brand_name: String,
    pub manufacturer: String,
    pub record_count: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl TransformSummary {
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }
}

pub struct TransformerService {
    source: Arc<dyn RawDataSource>,
    destination: Arc<dyn Destination>,
    transformers: HashMap<String, Arc<dyn Transformer>>,
}

impl TransformerService {
    /// Register every transformer under each brand name it supports
    pub fn new(
        source: Arc<dyn RawDataSource>,
        destination: Arc<dyn Destination>,
        transformers: Vec<Box<dyn Transformer>>,
    ) -> Self {
        let mut by_brand: HashMap<String, Arc<dyn Transformer>> = HashMap::new();
        for transformer in transformers {
            let transformer: Arc<dyn Transformer> = Arc::from(transformer);
            for brand in transformer.brand_names() {
                if let Some(previous) = by_brand.insert(brand_key(brand), Arc::clone(&transformer)) {
                    warn!(
                        brand = *brand,
                        previous = previous.manufacturer(),
                        replacement = transformer.manufacturer(),
                        "Replacing transformer registered for brand"
                    );
                }
            }
        }

        TransformerService {
            source,
            destination,
            transformers: by_brand,
        }
    }

    pub fn supports(&self, brand_name: &str) -> bool {
        self.transformers.contains_key(&brand_key(brand_name))
    }

    pub fn brands(&self) -> Vec<String> {
        let mut brands: Vec<String> = self.transformers.keys().cloned().collect();
        brands.sort();
        brands
    }

    /// Transform the stored snapshot `raw_data` points at and persist the result
    pub fn transform(&self, raw_data: &RawDataRef) -> Result<TransformSummary> {
        let data_id = raw_data.data_id.ok_or_else(|| {
            TransformError::InvalidArgument("raw data reference has no data id".to_string())
        })?;

        let fetched = self.source.fetch_raw_data(data_id)?;
        let canonical = fetched.raw_data;
        let model_id = canonical.model_id.ok_or_else(|| {
            TransformError::StateConflict(format!("raw data {} has no owning model", data_id))
        })?;
        if let Some(expected) = raw_data.model_id {
            if expected != model_id {
                return Err(TransformError::StateConflict(format!(
                    "raw data {} belongs to model {}, caller expected {}",
                    data_id, model_id, expected
                )));
            }
        }

        let transformer = self
            .transformers
            .get(&brand_key(&fetched.brand_name))
            .ok_or_else(|| TransformError::NoTransformer(fetched.brand_name.clone()))?;
        let document = canonical.raw_data.as_ref().ok_or_else(|| {
            TransformError::InvalidArgument(format!("raw data {} has no document", data_id))
        })?;

        info!(%data_id, %model_id, brand = %fetched.brand_name, "Transforming raw data");
        let output = transformer.transform(document)?;
        let record_count = output.records.len();

        self.destination.accept(output.records, &canonical)?;
        info!(%data_id, %model_id, records = record_count, "Stored model attributes");

        Ok(TransformSummary {
            data_id,
            model_id,
            brand_name: fetched.brand_name,
            manufacturer: transformer.manufacturer().to_string(),
            record_count,
            diagnostics: output.diagnostics,
        })
    }
}

fn brand_key(brand_name: &str) -> String {
    brand_name.trim().to_lowercase()
}

// ============================================================================
// IN-MEMORY COLLABORATORS
// ============================================================================

/// Raw snapshots held in memory, keyed by data id
#[derive(Debug, Default)]
pub struct MemoryRawDataSource {
    entries: RwLock<HashMap<Uuid, FetchedRawData>>,
}

impl MemoryRawDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot; the reference must carry a data id
    pub fn insert(&self, brand_name: &str, raw_data: RawDataRef) -> Result<Uuid> {
        let data_id = raw_data
            .data_id
            .ok_or_else(|| TransformError::InvalidArgument("raw data has no data id".to_string()))?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                data_id,
                FetchedRawData {
                    raw_data,
                    brand_name: brand_name.to_string(),
                },
            );
        Ok(data_id)
    }
}

impl RawDataSource for MemoryRawDataSource {
    fn fetch_raw_data(&self, data_id: Uuid) -> Result<FetchedRawData> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&data_id)
            .cloned()
            .ok_or_else(|| TransformError::NotFound(format!("raw data {}", data_id)))
    }
}

/// Attributes stored in memory per model
#[derive(Debug, Default)]
pub struct MemoryDestination {
    overwrite: bool,
    stored: RwLock<HashMap<Uuid, Vec<AttributeRecord>>>,
    accepted: AtomicUsize,
}

impl MemoryDestination {
    pub fn new(overwrite: bool) -> Self {
        MemoryDestination {
            overwrite,
            ..Default::default()
        }
    }

    pub fn attributes_for(&self, model_id: Uuid) -> Vec<AttributeRecord> {
        self.stored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&model_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of successful `accept` calls
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Destination for MemoryDestination {
    fn accept(&self, records: Vec<AttributeRecord>, raw_data: &RawDataRef) -> Result<()> {
        let model_id = raw_data
            .model_id
            .ok_or_else(|| TransformError::InvalidArgument("raw data has no model id".to_string()))?;

        let mut stored = self.stored.write().unwrap_or_else(PoisonError::into_inner);
        if !self.overwrite && stored.get(&model_id).map_or(false, |existing| !existing.is_empty()) {
            return Err(TransformError::AlreadyExists(format!("attributes for model {}", model_id)));
        }

        let records = records.into_iter().map(|r| r.with_model_id(model_id)).collect();
        stored.insert(model_id, records);
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
