// ⚖️ Reconciliation - MetadataUpdater policies + AttributeSet
//
// The same logical attribute shows up in many fragments of one raw document,
// each with a different amount of metadata. An AttributeSet keeps one record
// per (category, title) and asks a MetadataUpdater whether a later candidate's
// metadata should replace the stored one. Metadata is swapped wholesale, never
// merged field by field.

use crate::attributes::{AttributeCategory, AttributeKey, AttributeRecord, MetadataEntry, MetadataType};
use crate::error::{Result, TransformError};
use indexmap::IndexMap;
use std::fmt;
use tracing::debug;

// ============================================================================
// METADATA UPDATER
// ============================================================================

/// Conflict-resolution policy between a stored and a candidate metadata list.
///
/// Returns `Ok(true)` when `candidate` should replace `existing`. Implementations
/// must be side-effect free and defined for every present/absent combination.
pub trait MetadataUpdater: Send + Sync + fmt::Debug {
    fn update(
        &self,
        existing: Option<&[MetadataEntry]>,
        candidate: Option<&[MetadataEntry]>,
    ) -> Result<bool>;
}

/// Keeps the first metadata seen; only fills in a record that had none
#[derive(Debug, Clone, Copy, Default)]
pub struct FillMissing;

impl MetadataUpdater for FillMissing {
    fn update(
        &self,
        existing: Option<&[MetadataEntry]>,
        candidate: Option<&[MetadataEntry]>,
    ) -> Result<bool> {
        let has_candidate = candidate.map_or(false, |c| !c.is_empty());
        Ok(existing.is_none() && has_candidate)
    }
}

/// Price comparison policy on one metadata type.
///
/// `keep_lowest = true` favours starting prices (grade, body style);
/// `keep_lowest = false` favours the fullest price (accessories, packages).
#[derive(Debug, Clone, Copy)]
pub struct PriceUpdater {
    metadata_type: MetadataType,
    keep_lowest: bool,
}

impl PriceUpdater {
    pub fn new(metadata_type: MetadataType, keep_lowest: bool) -> Self {
        PriceUpdater {
            metadata_type,
            keep_lowest,
        }
    }

    pub fn lowest(metadata_type: MetadataType) -> Self {
        Self::new(metadata_type, true)
    }

    pub fn highest(metadata_type: MetadataType) -> Self {
        Self::new(metadata_type, false)
    }

    pub fn metadata_type(&self) -> MetadataType {
        self.metadata_type
    }

    pub fn keeps_lowest(&self) -> bool {
        self.keep_lowest
    }

    /// Single price of the candidate list. More than one entry, a null value or a
    /// non-numeric value is a data defect.
    fn candidate_price(&self, candidate: &[MetadataEntry]) -> Result<Option<f64>> {
        let mut matching = candidate
            .iter()
            .filter(|m| m.metadata_type == self.metadata_type);

        let entry = match matching.next() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let extra = matching.count();
        if extra > 0 {
            return Err(TransformError::DataInconsistency(format!(
                "candidate metadata carries {} entries of {:?}",
                extra + 1,
                self.metadata_type
            )));
        }

        match &entry.value {
            None => Err(TransformError::DataInconsistency(format!(
                "candidate {:?} value is null",
                self.metadata_type
            ))),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                TransformError::DataInconsistency(format!(
                    "candidate {:?} value is not numeric: {}",
                    self.metadata_type, value
                ))
            }),
        }
    }

    /// Stored price, if any; anything unusable counts as no price at all
    fn existing_price(&self, existing: &[MetadataEntry]) -> Option<f64> {
        existing
            .iter()
            .find(|m| m.metadata_type == self.metadata_type)
            .and_then(|m| m.value.as_ref())
            .and_then(|v| v.as_f64())
    }
}

impl MetadataUpdater for PriceUpdater {
    fn update(
        &self,
        existing: Option<&[MetadataEntry]>,
        candidate: Option<&[MetadataEntry]>,
    ) -> Result<bool> {
        let candidate = match candidate {
            Some(c) if !c.is_empty() => c,
            _ => return Ok(false),
        };

        let candidate_price = self.candidate_price(candidate)?;

        // Something beats nothing
        let existing = match existing {
            Some(e) => e,
            None => return Ok(true),
        };

        let candidate_price = match candidate_price {
            Some(price) => price,
            None => return Ok(false),
        };

        let existing_price = match self.existing_price(existing) {
            Some(price) => price,
            None => return Ok(true),
        };

        Ok(if self.keep_lowest {
            candidate_price < existing_price
        } else {
            candidate_price > existing_price
        })
    }
}

// ============================================================================
// ATTRIBUTE SET
// ============================================================================

/// Reconciling container keyed by attribute identity.
///
/// Iteration yields records in first-seen order of their identity, each carrying
/// whichever metadata the policy kept.
pub struct AttributeSet {
    entries: IndexMap<AttributeKey, Option<Vec<MetadataEntry>>>,
    updater: Box<dyn MetadataUpdater>,
}

impl AttributeSet {
    pub fn new(updater: impl MetadataUpdater + 'static) -> Self {
        AttributeSet {
            entries: IndexMap::new(),
            updater: Box::new(updater),
        }
    }

    /// Set that only fills in missing metadata
    pub fn fill_missing() -> Self {
        Self::new(FillMissing)
    }

    /// Add a candidate. Returns true if it was inserted or its metadata replaced
    /// the stored metadata. Blank titles are never stored.
    pub fn add(&mut self, record: AttributeRecord) -> Result<bool> {
        if record.title().trim().is_empty() {
            debug!(category = %record.category(), "Discarding attribute with empty title");
            return Ok(false);
        }

        let key = record.key();
        let (_, candidate) = record.split_metadata();

        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(key, candidate);
                Ok(true)
            }
            Some(stored) => {
                if self.updater.update(stored.as_deref(), candidate.as_deref())? {
                    *stored = candidate;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Identity-only membership test
    pub fn contains(&self, record: &AttributeRecord) -> bool {
        self.entries.contains_key(&record.key())
    }

    pub fn metadata_for(&self, category: AttributeCategory, title: &str) -> Option<&[MetadataEntry]> {
        let key = AttributeKey {
            category,
            title: title.to_string(),
        };
        self.entries.get(&key).and_then(|m| m.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AttributeRecord> + '_ {
        self.entries.iter().map(|(key, metadata)| {
            AttributeRecord::new(key.category, key.title.clone()).with_optional_metadata(metadata.clone())
        })
    }

    pub fn into_records(self) -> Vec<AttributeRecord> {
        self.entries
            .into_iter()
            .map(|(key, metadata)| AttributeRecord::new(key.category, key.title).with_optional_metadata(metadata))
            .collect()
    }
}

impl fmt::Debug for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSet")
            .field("len", &self.entries.len())
            .field("updater", &self.updater)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{MetadataUnit, MetadataValue};
    use proptest::prelude::*;

    fn price(amount: i64) -> Vec<MetadataEntry> {
        vec![MetadataEntry::dollars(MetadataType::CommonBaseMsrp, amount)]
    }

    fn grade(amount: i64) -> AttributeRecord {
        AttributeRecord::new(AttributeCategory::Grade, "LE").with_metadata(price(amount))
    }

    #[test]
    fn test_price_updater_keep_lowest() {
        let updater = PriceUpdater::lowest(MetadataType::CommonBaseMsrp);
        assert!(updater.update(Some(&price(26_220)), Some(&price(26_120))).unwrap());
        assert!(!updater.update(Some(&price(26_120)), Some(&price(26_220))).unwrap());
        assert!(!updater.update(Some(&price(26_120)), Some(&price(26_120))).unwrap(), "ties keep existing");
    }

    #[test]
    fn test_price_updater_keep_highest() {
        let updater = PriceUpdater::highest(MetadataType::CommonBaseMsrp);
        assert!(updater.update(Some(&price(100)), Some(&price(250))).unwrap());
        assert!(!updater.update(Some(&price(250)), Some(&price(100))).unwrap());
    }

    #[test]
    fn test_price_updater_absent_arguments() {
        let updater = PriceUpdater::lowest(MetadataType::CommonBaseMsrp);
        assert!(!updater.update(None, None).unwrap());
        assert!(!updater.update(Some(&price(1)), None).unwrap());
        assert!(!updater.update(None, Some(&[])).unwrap());
        assert!(updater.update(None, Some(&price(1))).unwrap());

        // Candidate without the price type still beats nothing at all
        let seating = vec![MetadataEntry::new(MetadataType::BodyStyleSeating, 5)
            .with_unit(MetadataUnit::Passengers)];
        assert!(updater.update(None, Some(&seating)).unwrap());
        assert!(!updater.update(Some(&price(1)), Some(&seating)).unwrap());

        // Stored metadata without a price loses to a priced candidate
        assert!(updater.update(Some(&seating), Some(&price(1))).unwrap());
    }

    #[test]
    fn test_price_updater_rejects_ambiguous_candidate() {
        let updater = PriceUpdater::lowest(MetadataType::CommonBaseMsrp);
        let mut doubled = price(10);
        doubled.extend(price(20));

        let result = updater.update(Some(&price(15)), Some(&doubled));
        assert!(matches!(result, Err(TransformError::DataInconsistency(_))));
    }

    #[test]
    fn test_price_updater_rejects_null_and_text_values() {
        let updater = PriceUpdater::lowest(MetadataType::CommonBaseMsrp);

        let null = vec![MetadataEntry::null(MetadataType::CommonBaseMsrp)];
        assert!(matches!(
            updater.update(None, Some(&null)),
            Err(TransformError::DataInconsistency(_))
        ));

        let text = vec![MetadataEntry::new(MetadataType::CommonBaseMsrp, "call dealer")];
        assert!(matches!(
            updater.update(Some(&price(5)), Some(&text)),
            Err(TransformError::DataInconsistency(_))
        ));
    }

    #[test]
    fn test_fill_missing() {
        assert!(FillMissing.update(None, Some(&price(3))).unwrap());
        assert!(!FillMissing.update(Some(&price(3)), Some(&price(1))).unwrap());
        assert!(!FillMissing.update(None, None).unwrap());
    }

    #[test]
    fn test_attribute_set_keeps_lowest_grade_price() {
        let mut set = AttributeSet::new(PriceUpdater::lowest(MetadataType::CommonBaseMsrp));
        assert!(set.add(grade(26_220)).unwrap());
        assert!(set.add(grade(26_120)).unwrap());
        assert!(!set.add(grade(26_500)).unwrap());

        let records = set.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title(), "LE");
        assert_eq!(
            records[0].metadata_value(MetadataType::CommonBaseMsrp),
            Some(&MetadataValue::Integer(26_120))
        );
    }

    #[test]
    fn test_attribute_set_discards_blank_titles() {
        let mut set = AttributeSet::fill_missing();
        assert!(!set.add(AttributeRecord::new(AttributeCategory::Drive, "")).unwrap());
        assert!(!set.add(AttributeRecord::new(AttributeCategory::Drive, "   ")).unwrap());
        assert!(set.is_empty());
    }

    #[test]
    fn test_attribute_set_contains_by_identity() {
        let mut set = AttributeSet::fill_missing();
        set.add(AttributeRecord::new(AttributeCategory::Drive, "AWD")).unwrap();

        assert!(set.contains(&AttributeRecord::new(AttributeCategory::Drive, "AWD").with_metadata(price(1))));
        assert!(!set.contains(&AttributeRecord::new(AttributeCategory::Drive, "FWD")));
        assert!(!set.contains(&AttributeRecord::new(AttributeCategory::Grade, "AWD")));
    }

    #[test]
    fn test_attribute_set_preserves_first_seen_order() {
        let mut set = AttributeSet::new(PriceUpdater::highest(MetadataType::CommonMsrp));
        for title in ["Mudguards", "Roof Rack", "Mudguards", "Floor Mats"] {
            set.add(AttributeRecord::new(AttributeCategory::Accessory, title)).unwrap();
        }

        let titles: Vec<String> = set.iter().map(|r| r.title().to_string()).collect();
        assert_eq!(titles, vec!["Mudguards", "Roof Rack", "Floor Mats"]);
    }

    #[test]
    fn test_attribute_set_propagates_inconsistency() {
        let mut set = AttributeSet::new(PriceUpdater::lowest(MetadataType::CommonBaseMsrp));
        set.add(grade(100)).unwrap();

        let broken = AttributeRecord::new(AttributeCategory::Grade, "LE")
            .with_metadata(vec![MetadataEntry::null(MetadataType::CommonBaseMsrp)]);
        assert!(set.add(broken).is_err());
        assert_eq!(
            set.metadata_for(AttributeCategory::Grade, "LE"),
            Some(price(100).as_slice()),
            "failed add must leave stored metadata untouched"
        );
    }

    proptest! {
        #[test]
        fn test_reconciliation_is_order_independent(
            prices in prop::collection::vec(0i64..200_000, 1..12),
            keep_lowest in any::<bool>(),
        ) {
            let updater = PriceUpdater::new(MetadataType::CommonBaseMsrp, keep_lowest);

            let mut forward = AttributeSet::new(updater);
            for p in &prices {
                forward.add(grade(*p)).unwrap();
            }

            let mut backward = AttributeSet::new(updater);
            for p in prices.iter().rev() {
                backward.add(grade(*p)).unwrap();
            }

            let expected = if keep_lowest {
                prices.iter().copied().min()
            } else {
                prices.iter().copied().max()
            };
            let expected = expected.map(price);

            prop_assert_eq!(forward.metadata_for(AttributeCategory::Grade, "LE").map(|m| m.to_vec()), expected.clone());
            prop_assert_eq!(backward.metadata_for(AttributeCategory::Grade, "LE").map(|m| m.to_vec()), expected);
        }
    }
}
