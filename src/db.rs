// 🗄️ SQLite storage - brands, models, raw snapshots, model attributes
//
// Reference RawDataSource / Destination backed by one shared connection.
// Rows cross the boundary as RawDataRow / PersistedAttribute and go through
// the Converter, the same path any other storage would take.

use crate::attributes::{AttributeCategory, AttributeRecord};
use crate::converter::{Converter, PersistedAttribute, RawDataRef, RawDataRow};
use crate::error::{Result, TransformError};
use crate::service::{Destination, FetchedRawData, RawDataSource};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

/// One connection shared by source and destination
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<SharedConnection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Brand / Model
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS brand (
            brand_id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS model (
            model_id TEXT PRIMARY KEY,
            brand_id TEXT NOT NULL REFERENCES brand(brand_id),
            name TEXT NOT NULL,
            year INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (brand_id, name, year)
        )",
        [],
    )?;

    // ==========================================================================
    // Raw snapshots (document kept verbatim as JSON text)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS raw_data (
            data_id TEXT PRIMARY KEY,
            model_id TEXT NOT NULL REFERENCES model(model_id),
            raw_data TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Model attributes (metadata is a JSON blob or NULL)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS model_attribute (
            attribute_id TEXT PRIMARY KEY,
            model_id TEXT NOT NULL REFERENCES model(model_id),
            category TEXT NOT NULL,
            title TEXT NOT NULL,
            metadata TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE (model_id, category, title)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_raw_data_model ON raw_data(model_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_model_attribute_model ON model_attribute(model_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

/// Brand id for `name`, creating the row on first use
pub fn insert_brand(conn: &Connection, name: &str) -> Result<Uuid> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT brand_id FROM brand WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(brand_id) = existing {
        return parse_uuid(&brand_id);
    }

    let brand_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO brand (brand_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![brand_id.to_string(), name, Utc::now().to_rfc3339()],
    )?;
    info!(brand = name, %brand_id, "Created brand");
    Ok(brand_id)
}

/// Model id for (brand, name, year), creating the row on first use
pub fn insert_model(conn: &Connection, brand_id: Uuid, name: &str, year: i32) -> Result<Uuid> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT model_id FROM model WHERE brand_id = ?1 AND name = ?2 AND year = ?3",
            params![brand_id.to_string(), name, year],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(model_id) = existing {
        return parse_uuid(&model_id);
    }

    let model_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO model (model_id, brand_id, name, year, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![model_id.to_string(), brand_id.to_string(), name, year, Utc::now().to_rfc3339()],
    )?;
    info!(model = name, year, %model_id, "Created model");
    Ok(model_id)
}

/// Store a new raw snapshot for an existing model
pub fn insert_raw_data(conn: &Connection, model_id: Uuid, document: &Value) -> Result<RawDataRow> {
    if !model_exists(conn, model_id)? {
        return Err(TransformError::NotFound(format!("model {}", model_id)));
    }

    let row = RawDataRow {
        data_id: Uuid::new_v4(),
        model_id,
        raw_data: serde_json::to_string(document)?,
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO raw_data (data_id, model_id, raw_data, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            row.data_id.to_string(),
            row.model_id.to_string(),
            row.raw_data,
            row.created_at.to_rfc3339(),
        ],
    )?;
    debug!(data_id = %row.data_id, %model_id, bytes = row.raw_data.len(), "Stored raw data");
    Ok(row)
}

// ============================================================================
// READS
// ============================================================================

pub fn model_exists(conn: &Connection, model_id: Uuid) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM model WHERE model_id = ?1",
        params![model_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Raw snapshot row plus the name of the brand that owns its model
pub fn get_raw_data(conn: &Connection, data_id: Uuid) -> Result<(RawDataRow, String)> {
    let found: Option<(String, String, String, String)> = conn
        .query_row(
            "SELECT r.model_id, r.raw_data, r.created_at, b.name
             FROM raw_data r
             JOIN model m ON m.model_id = r.model_id
             JOIN brand b ON b.brand_id = m.brand_id
             WHERE r.data_id = ?1",
            params![data_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let (model_id, raw_data, created_at, brand_name) =
        found.ok_or_else(|| TransformError::NotFound(format!("raw data {}", data_id)))?;
    let row = RawDataRow {
        data_id,
        model_id: parse_uuid(&model_id)?,
        raw_data,
        created_at: parse_timestamp(&created_at)?,
    };
    Ok((row, brand_name))
}

/// Stored attribute rows of one model, in the order they were written
pub fn get_persisted_attributes(conn: &Connection, model_id: Uuid) -> Result<Vec<PersistedAttribute>> {
    let mut stmt = conn.prepare(
        "SELECT attribute_id, category, title, metadata, updated_at
         FROM model_attribute
         WHERE model_id = ?1
         ORDER BY rowid",
    )?;

    let rows = stmt
        .query_map(params![model_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(attribute_id, category, title, metadata, updated_at)| -> Result<PersistedAttribute> {
            Ok(PersistedAttribute {
                attribute_id: Some(parse_uuid(&attribute_id)?),
                category: AttributeCategory::from_code(&category).ok_or_else(|| {
                    TransformError::DataInconsistency(format!("unknown attribute category {:?}", category))
                })?,
                title,
                model_id: Some(model_id),
                metadata,
                updated_at: Some(parse_timestamp(&updated_at)?),
            })
        })
        .collect()
}

pub fn get_attributes_for_model(
    conn: &Connection,
    converter: &Converter,
    model_id: Uuid,
) -> Result<Vec<AttributeRecord>> {
    converter.convert_all(get_persisted_attributes(conn, model_id)?)
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|e| TransformError::DataInconsistency(format!("invalid id {:?}: {}", text, e)))
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TransformError::DataInconsistency(format!("invalid timestamp {:?}: {}", text, e)))
}

/// Lock the shared connection; a poisoned lock still yields the connection
pub fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// COLLABORATORS
// ============================================================================

pub struct SqliteRawDataSource {
    conn: SharedConnection,
    converter: Arc<Converter>,
}

impl SqliteRawDataSource {
    pub fn new(conn: SharedConnection, converter: Arc<Converter>) -> Self {
        SqliteRawDataSource { conn, converter }
    }
}

impl RawDataSource for SqliteRawDataSource {
    fn fetch_raw_data(&self, data_id: Uuid) -> Result<FetchedRawData> {
        let (row, brand_name) = get_raw_data(&lock(&self.conn), data_id)?;
        let raw_data: RawDataRef = self.converter.convert(row)?;
        Ok(FetchedRawData { raw_data, brand_name })
    }
}

pub struct SqliteDestination {
    conn: SharedConnection,
    converter: Arc<Converter>,
    overwrite: bool,
}

impl SqliteDestination {
    pub fn new(conn: SharedConnection, converter: Arc<Converter>) -> Self {
        SqliteDestination {
            conn,
            converter,
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl Destination for SqliteDestination {
    fn accept(&self, records: Vec<AttributeRecord>, raw_data: &RawDataRef) -> Result<()> {
        let model_id = raw_data
            .model_id
            .ok_or_else(|| TransformError::InvalidArgument("raw data has no model id".to_string()))?;

        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;

        if !model_exists(&tx, model_id)? {
            return Err(TransformError::NotFound(format!("model {}", model_id)));
        }
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM model_attribute WHERE model_id = ?1",
            params![model_id.to_string()],
            |row| row.get(0),
        )?;
        if existing > 0 && !self.overwrite {
            return Err(TransformError::AlreadyExists(format!(
                "{} attributes for model {}",
                existing, model_id
            )));
        }

        tx.execute(
            "DELETE FROM model_attribute WHERE model_id = ?1",
            params![model_id.to_string()],
        )?;

        let now = Utc::now();
        let count = records.len();
        for record in records {
            let record = match record.attribute_id() {
                Some(_) => record,
                None => record.with_attribute_id(Uuid::new_v4()),
            }
            .with_model_id(model_id)
            .with_updated_at(now);

            let row: PersistedAttribute = self.converter.convert(record)?;
            tx.execute(
                "INSERT INTO model_attribute (
                    attribute_id, model_id, category, title, metadata, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.attribute_id.map(|id| id.to_string()),
                    model_id.to_string(),
                    row.category.code(),
                    row.title,
                    row.metadata,
                    now.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        info!(%model_id, replaced = existing, stored = count, "Replaced model attributes");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{MetadataEntry, MetadataType};
    use crate::brands::default_transformers;
    use crate::service::TransformerService;
    use serde_json::json;

    fn shared() -> SharedConnection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn converter() -> Arc<Converter> {
        Arc::new(Converter::with_defaults().unwrap())
    }

    fn seed_model(conn: &SharedConnection, brand: &str, model: &str) -> Uuid {
        let conn = lock(conn);
        let brand_id = insert_brand(&conn, brand).unwrap();
        insert_model(&conn, brand_id, model, 2024).unwrap()
    }

    fn engine(title: &str, hp: i64) -> AttributeRecord {
        AttributeRecord::new(AttributeCategory::Engine, title)
            .with_entry(MetadataEntry::new(MetadataType::EngineHorsepower, hp))
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).expect("second setup should be a no-op");
    }

    #[test]
    fn test_brand_and_model_are_reused() {
        let conn = shared();
        let first = seed_model(&conn, "Toyota", "Camry");
        let second = seed_model(&conn, "Toyota", "Camry");
        assert_eq!(first, second, "same brand/model/year should resolve to one model");

        let other = seed_model(&conn, "Toyota", "Corolla");
        assert_ne!(first, other);
    }

    #[test]
    fn test_raw_data_round_trip() {
        let conn = shared();
        let model_id = seed_model(&conn, "Lexus", "RX");
        let document = json!({"model": [{"title": "RX 350"}]});
        let stored = insert_raw_data(&lock(&conn), model_id, &document).unwrap();

        let source = SqliteRawDataSource::new(conn.clone(), converter());
        let fetched = source.fetch_raw_data(stored.data_id).unwrap();

        assert_eq!(fetched.brand_name, "Lexus");
        assert_eq!(fetched.raw_data.model_id, Some(model_id));
        assert_eq!(fetched.raw_data.raw_data, Some(document));
    }

    #[test]
    fn test_raw_data_needs_known_model() {
        let conn = shared();
        let result = insert_raw_data(&lock(&conn), Uuid::new_v4(), &json!({"a": 1}));
        assert!(matches!(result, Err(TransformError::NotFound(_))));

        let source = SqliteRawDataSource::new(conn, converter());
        assert!(matches!(source.fetch_raw_data(Uuid::new_v4()), Err(TransformError::NotFound(_))));
    }

    #[test]
    fn test_destination_stores_records_in_order() {
        let conn = shared();
        let model_id = seed_model(&conn, "Toyota", "Camry");
        let destination = SqliteDestination::new(conn.clone(), converter());
        let raw = RawDataRef::new(Uuid::new_v4()).with_model_id(model_id);

        let records = vec![
            engine("2.5L 4-Cyl", 203),
            AttributeRecord::new(AttributeCategory::Drive, "FWD"),
        ];
        destination.accept(records, &raw).unwrap();

        let stored = get_attributes_for_model(&lock(&conn), &converter(), model_id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], engine("2.5L 4-Cyl", 203));
        assert_eq!(stored[0].metadata(), engine("2.5L 4-Cyl", 203).metadata());
        assert_eq!(stored[1].title(), "FWD");
        assert!(stored.iter().all(|r| r.model_id() == Some(model_id) && r.attribute_id().is_some()));
        assert!(stored[1].metadata().is_none(), "absent metadata should stay absent");
    }

    #[test]
    fn test_metadata_blob_format() {
        let conn = shared();
        let model_id = seed_model(&conn, "Toyota", "Camry");
        let record = AttributeRecord::new(AttributeCategory::Package, "Cold Weather")
            .with_entry(MetadataEntry::dollars(MetadataType::CommonMsrp, 2540));
        SqliteDestination::new(conn.clone(), converter())
            .accept(vec![record], &RawDataRef::new(Uuid::new_v4()).with_model_id(model_id))
            .unwrap();

        let blob: String = lock(&conn)
            .query_row("SELECT metadata FROM model_attribute", [], |row| row.get(0))
            .unwrap();
        let parsed: Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(parsed[0]["metadataType"], "COMMON_MSRP");
        assert_eq!(parsed[0]["value"], 2540);
        assert_eq!(parsed[0]["unit"], "DOLLARS");
    }

    #[test]
    fn test_existing_attributes_without_overwrite() {
        let conn = shared();
        let model_id = seed_model(&conn, "Toyota", "Camry");
        let destination = SqliteDestination::new(conn.clone(), converter());
        let raw = RawDataRef::new(Uuid::new_v4()).with_model_id(model_id);

        destination.accept(vec![engine("V6", 301)], &raw).unwrap();
        let second = destination.accept(vec![engine("I4", 203)], &raw);
        assert!(matches!(second, Err(TransformError::AlreadyExists(_))));

        let stored = get_attributes_for_model(&lock(&conn), &converter(), model_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title(), "V6", "rejected write must leave stored rows untouched");
    }

    #[test]
    fn test_overwrite_replaces_all() {
        let conn = shared();
        let model_id = seed_model(&conn, "Toyota", "Camry");
        let destination = SqliteDestination::new(conn.clone(), converter()).with_overwrite(true);
        let raw = RawDataRef::new(Uuid::new_v4()).with_model_id(model_id);

        destination
            .accept(vec![engine("V6", 301), AttributeRecord::new(AttributeCategory::Drive, "AWD")], &raw)
            .unwrap();
        destination.accept(vec![engine("I4", 203)], &raw).unwrap();

        let stored = get_attributes_for_model(&lock(&conn), &converter(), model_id).unwrap();
        assert_eq!(stored, vec![AttributeRecord::new(AttributeCategory::Engine, "I4")]);
    }

    #[test]
    fn test_unknown_model_is_not_found() {
        let conn = shared();
        let destination = SqliteDestination::new(conn, converter());
        let raw = RawDataRef::new(Uuid::new_v4()).with_model_id(Uuid::new_v4());
        assert!(matches!(destination.accept(vec![engine("V6", 301)], &raw), Err(TransformError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_record_rolls_back() {
        let conn = shared();
        let model_id = seed_model(&conn, "Toyota", "Camry");
        let destination = SqliteDestination::new(conn.clone(), converter()).with_overwrite(true);
        let raw = RawDataRef::new(Uuid::new_v4()).with_model_id(model_id);

        destination.accept(vec![engine("V6", 301)], &raw).unwrap();
        let result = destination.accept(vec![engine("I4", 203), engine("I4", 200)], &raw);
        assert!(matches!(result, Err(TransformError::Storage(_))));

        let stored = get_attributes_for_model(&lock(&conn), &converter(), model_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title(), "V6", "failed replace must not delete the old rows");
    }

    #[test]
    fn test_service_over_sqlite() {
        let conn = shared();
        let model_id = seed_model(&conn, "Toyota", "Camry");
        let document = json!({"model": [
            {"title": "Camry", "engine": {"title": "2.5L 4-Cyl [Hybrid]"}},
            {"title": "Camry", "drive": {"title": "AWD"}}
        ]});
        let stored = insert_raw_data(&lock(&conn), model_id, &document).unwrap();

        let converter = converter();
        let service = TransformerService::new(
            Arc::new(SqliteRawDataSource::new(conn.clone(), converter.clone())),
            Arc::new(SqliteDestination::new(conn.clone(), converter.clone())),
            default_transformers(),
        );
        let summary = service
            .transform(&RawDataRef::new(stored.data_id).with_model_id(model_id))
            .unwrap();

        let attributes = get_attributes_for_model(&lock(&conn), &converter, model_id).unwrap();
        assert_eq!(attributes.len(), summary.record_count);
        assert!(attributes.contains(&AttributeRecord::new(AttributeCategory::Drive, "AWD")));
    }
}
