use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use vehicle_catalog::db::{self, SharedConnection};
use vehicle_catalog::{
    default_transformers, AppConfig, ConfigArgs, Converter, DiagnosticKind, RawDataRef, RawDataRow,
    SqliteDestination, SqliteRawDataSource, TransformSummary, TransformerService,
};

#[derive(Parser, Debug)]
#[command(name = "vehicle-catalog")]
#[command(about = "Reconcile manufacturer vehicle data into model attributes")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a raw manufacturer document and print its data id
    Import {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        year: i32,
        /// JSON document as fetched from the manufacturer
        file: PathBuf,
    },
    /// Transform a stored document into model attributes
    Transform {
        data_id: Uuid,
        /// Fail unless the document belongs to this model
        #[arg(long)]
        model_id: Option<Uuid>,
    },
    /// Write a model's stored attributes as CSV to stdout
    Export { model_id: Uuid },
}

fn main() -> Result<()> {
    AppConfig::load_dotenv();
    let cli = Cli::parse();
    let config = AppConfig::from(cli.config);

    // Logs go to stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let conn = db::open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Import { brand, model, year, file } => {
            let document = read_document(&file)?;
            run_import(&conn, &brand, &model, year, &document, &mut out).map(|_| ())
        }
        Command::Transform { data_id, model_id } => {
            run_transform(&conn, config.overwrite_existing, data_id, model_id, &mut out).map(|_| ())
        }
        Command::Export { model_id } => run_export(&conn, model_id, &mut out).map(|_| ()),
    }
}

fn read_document(file: &Path) -> Result<Value> {
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", file.display()))
}

fn run_import(
    conn: &SharedConnection,
    brand: &str,
    model: &str,
    year: i32,
    document: &Value,
    out: &mut impl Write,
) -> Result<RawDataRow> {
    let guard = db::lock(conn);
    let brand_id = db::insert_brand(&guard, brand)?;
    let model_id = db::insert_model(&guard, brand_id, model, year)?;
    let row = db::insert_raw_data(&guard, model_id, document)?;

    info!(data_id = %row.data_id, %model_id, "Imported raw data");
    writeln!(out, "✓ Imported {} {} {}", year, brand, model)?;
    writeln!(out, "  model id: {}", model_id)?;
    writeln!(out, "  data id:  {}", row.data_id)?;
    Ok(row)
}

fn run_transform(
    conn: &SharedConnection,
    overwrite: bool,
    data_id: Uuid,
    model_id: Option<Uuid>,
    out: &mut impl Write,
) -> Result<TransformSummary> {
    let converter = Arc::new(Converter::with_defaults()?);
    let service = TransformerService::new(
        Arc::new(SqliteRawDataSource::new(conn.clone(), converter.clone())),
        Arc::new(SqliteDestination::new(conn.clone(), converter).with_overwrite(overwrite)),
        default_transformers(),
    );

    let mut reference = RawDataRef::new(data_id);
    reference.model_id = model_id;
    let summary = service
        .transform(&reference)
        .with_context(|| format!("Failed to transform raw data {}", data_id))?;

    writeln!(out, "✓ {} ({}) model {}", summary.brand_name, summary.manufacturer, summary.model_id)?;
    writeln!(out, "  attributes stored:  {}", summary.record_count)?;
    for (label, kind) in [
        ("fields skipped", DiagnosticKind::FieldParse),
        ("titles missing", DiagnosticKind::TitleMissing),
        ("empty parsers", DiagnosticKind::NoAttributes),
        ("schema mismatches", DiagnosticKind::UnexpectedSchema),
        ("parsers failed", DiagnosticKind::ParserFailed),
    ] {
        writeln!(out, "  {:<19} {}", format!("{}:", label), summary.count(kind))?;
    }
    Ok(summary)
}

#[derive(Serialize)]
struct ExportRow {
    category: &'static str,
    title: String,
    metadata: String,
    attribute_id: String,
    updated_at: String,
}

/// Write the model's attributes as CSV; returns the row count
fn run_export(conn: &SharedConnection, model_id: Uuid, out: &mut impl Write) -> Result<usize> {
    let rows = db::get_persisted_attributes(&db::lock(conn), model_id)?;

    let mut writer = csv::Writer::from_writer(out);
    for row in &rows {
        writer.serialize(ExportRow {
            category: row.category.code(),
            title: row.title.clone(),
            metadata: row.metadata.clone().unwrap_or_default(),
            attribute_id: row.attribute_id.map(|id| id.to_string()).unwrap_or_default(),
            updated_at: row.updated_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        })?;
    }
    writer.flush().context("Failed to write CSV")?;

    info!(%model_id, rows = rows.len(), "Exported attributes");
    Ok(rows.len())
}
