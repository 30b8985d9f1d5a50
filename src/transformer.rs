// 🔄 Transformer - brand-level chain of AttributeParsers
//
// Runs every parser of a brand over one raw document, keeps going when a single
// parser fails, and returns records together with the diagnostics collected
// along the way.

use crate::attributes::{AttributeCategory, AttributeRecord};
use crate::error::{Result, TransformError};
use crate::parser::{AttributeParser, ParseContext};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// One metadata field was malformed and skipped
    FieldParse,
    /// A fragment had an empty title and was skipped
    TitleMissing,
    /// A parser ran cleanly but found nothing
    NoAttributes,
    /// A parser's container had the wrong shape; the parser contributed nothing
    UnexpectedSchema,
    /// A parser failed for any other reason; the parser contributed nothing
    ParserFailed,
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::FieldParse | DiagnosticKind::TitleMissing => Severity::Debug,
            DiagnosticKind::NoAttributes => Severity::Info,
            DiagnosticKind::UnexpectedSchema | DiagnosticKind::ParserFailed => Severity::Warning,
        }
    }
}

/// One recovered failure, kept so callers can assert on it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub parser: &'static str,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(parser: &'static str, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic {
            parser,
            kind,
            severity: kind.severity(),
            message: message.into(),
        }
    }
}

/// Result of one transform call
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub records: Vec<AttributeRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TransformOutput {
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    pub fn records_in(&self, category: AttributeCategory) -> impl Iterator<Item = &AttributeRecord> {
        self.records.iter().filter(move |r| r.category() == category)
    }

    pub fn find(&self, category: AttributeCategory, title: &str) -> Option<&AttributeRecord> {
        self.records
            .iter()
            .find(|r| r.category() == category && r.title() == title)
    }
}

// ============================================================================
// TRANSFORMER TRAIT
// ============================================================================

/// Transformer - turns one brand's raw document into attribute records
pub trait Transformer: Send + Sync {
    fn manufacturer(&self) -> &str;

    /// Every brand name this transformer handles
    fn brand_names(&self) -> &[&'static str];

    fn can_transform(&self, brand_name: &str) -> bool {
        self.brand_names()
            .iter()
            .any(|b| b.eq_ignore_ascii_case(brand_name.trim()))
    }

    fn transform(&self, document: &Value) -> Result<TransformOutput>;
}

/// Builds the log label for a document ("2024 - Toyota Camry")
pub type ModelIdentifier = fn(&Value) -> String;

/// Cross-category fix-up run after every parser
pub type PostPass = fn(Vec<AttributeRecord>) -> Vec<AttributeRecord>;

// ============================================================================
// BRAND TRANSFORMER
// ============================================================================

/// Ordered parser chain plus an optional post-pass
pub struct BrandTransformer {
    manufacturer: &'static str,
    brand_names: Vec<&'static str>,
    parsers: Vec<Box<dyn AttributeParser>>,
    identify: ModelIdentifier,
    post_pass: Option<PostPass>,
}

impl BrandTransformer {
    pub fn new(
        manufacturer: &'static str,
        brand_names: Vec<&'static str>,
        identify: ModelIdentifier,
    ) -> Self {
        BrandTransformer {
            manufacturer,
            brand_names,
            parsers: Vec::new(),
            identify,
            post_pass: None,
        }
    }

    /// Builder pattern: append a parser (runs in insertion order)
    pub fn with_parser(mut self, parser: impl AttributeParser + 'static) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    pub fn with_post_pass(mut self, post_pass: PostPass) -> Self {
        self.post_pass = Some(post_pass);
        self
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }
}

fn ensure_document(document: &Value) -> Result<()> {
    let empty = match document {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty {
        return Err(TransformError::InvalidArgument(
            "raw data document is null or empty".to_string(),
        ));
    }
    Ok(())
}

impl Transformer for BrandTransformer {
    fn manufacturer(&self) -> &str {
        self.manufacturer
    }

    fn brand_names(&self) -> &[&'static str] {
        &self.brand_names
    }

    fn transform(&self, document: &Value) -> Result<TransformOutput> {
        ensure_document(document)?;

        let mut ctx = ParseContext::new((self.identify)(document));
        info!(manufacturer = self.manufacturer, model = %ctx.model(), "Transforming raw data");

        let mut records = Vec::new();
        for parser in &self.parsers {
            match parser.parse(document, &mut ctx) {
                Ok(parsed) => {
                    debug!(parser = parser.name(), count = parsed.len(), "Parser finished");
                    records.extend(parsed);
                }
                Err(err) if err.is_recoverable() => ctx.unexpected_schema(parser.name(), &err),
                Err(err) => ctx.parser_failed(parser.name(), &err),
            }
        }

        if let Some(post_pass) = self.post_pass {
            records = post_pass(records);
        }

        info!(
            manufacturer = self.manufacturer,
            model = %ctx.model(),
            records = records.len(),
            "Transform complete"
        );

        Ok(TransformOutput {
            records,
            diagnostics: ctx.into_diagnostics(),
        })
    }
}

// ============================================================================
// ACCESSORY / PACKAGE DE-DUPLICATION
// ============================================================================

fn package_preference(record: &AttributeRecord) -> u8 {
    match (record.category(), record.has_metadata()) {
        (AttributeCategory::Accessory, true) => 2,
        (AttributeCategory::Package, _) => 1,
        _ => 0,
    }
}

/// Keep one record per title across Accessory and Package.
///
/// An Accessory wins only when it carries metadata, otherwise the Package does.
/// Other categories pass through first, followed by the chosen records in
/// first-seen title order.
pub fn dedupe_accessories_and_packages(records: Vec<AttributeRecord>) -> Vec<AttributeRecord> {
    let mut unaffected = Vec::with_capacity(records.len());
    let mut chosen: IndexMap<String, AttributeRecord> = IndexMap::new();

    for record in records {
        match record.category() {
            AttributeCategory::Accessory | AttributeCategory::Package => {
                match chosen.get_mut(record.title()) {
                    Some(current) => {
                        if package_preference(&record) > package_preference(current) {
                            debug!(title = record.title(), keep = %record.category(), "Resolved accessory/package duplicate");
                            *current = record;
                        }
                    }
                    None => {
                        chosen.insert(record.title().to_string(), record);
                    }
                }
            }
            _ => unaffected.push(record),
        }
    }

    unaffected.extend(chosen.into_values());
    unaffected
}

// ============================================================================
// TESTS
// ============================================================================
