// 🏗️ Parser Framework - one AttributeParser per attribute category
// Shared normalization (prices, digits, bracketed codes) and JSON path helpers.
//
// Failure scopes:
//   field missing            -> value skipped silently
//   field malformed          -> value skipped, FieldParse diagnostic
//   fragment title empty     -> fragment skipped, TitleMissing diagnostic
//   container has wrong type -> TransformError::SchemaShape, UnexpectedSchema diagnostic
//   any other parser error   -> parser skipped, ParserFailed diagnostic

use crate::attributes::{AttributeCategory, AttributeRecord, FuelType};
use crate::error::{FieldError, Result, TransformError};
use crate::reconciliation::AttributeSet;
use crate::transformer::{Diagnostic, DiagnosticKind, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

// ============================================================================
// CORE TRAIT
// ============================================================================

/// AttributeParser - extracts one attribute category from a raw document
pub trait AttributeParser: Send + Sync {
    /// Name used in logs and diagnostics
    fn name(&self) -> &'static str;

    fn category(&self) -> AttributeCategory;

    /// Parse a raw document into reconciled records.
    ///
    /// A missing sub-structure yields an empty list (or the category's default
    /// record). Only a container of the wrong type is an error.
    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>>;
}

// ============================================================================
// PARSE CONTEXT
// ============================================================================

/// Per-document state shared by every parser of one transform call
#[derive(Debug, Clone)]
pub struct ParseContext {
    model: String,
    diagnostics: Vec<Diagnostic>,
}

impl ParseContext {
    pub fn new(model: impl Into<String>) -> Self {
        ParseContext {
            model: model.into(),
            diagnostics: Vec::new(),
        }
    }

    /// Model identifier used in log lines
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Log and record one event
    pub fn record(&mut self, parser: &'static str, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(parser, kind, message);
        match diagnostic.severity {
            Severity::Debug => debug!(parser, model = %self.model, "{}", diagnostic.message),
            Severity::Info => info!(parser, model = %self.model, "{}", diagnostic.message),
            Severity::Warning => warn!(parser, model = %self.model, "{}", diagnostic.message),
        }
        self.diagnostics.push(diagnostic);
    }

    /// Unwrap a field extraction, recording malformed values.
    /// Absent fields come back as `None` without a diagnostic.
    pub fn field<T>(
        &mut self,
        parser: &'static str,
        field: &str,
        extracted: std::result::Result<Option<T>, FieldError>,
    ) -> Option<T> {
        match extracted {
            Ok(value) => value,
            Err(err) => {
                self.record(
                    parser,
                    DiagnosticKind::FieldParse,
                    format!("Could not parse {}: {}", field, err),
                );
                None
            }
        }
    }

    pub fn title_missing(&mut self, parser: &'static str, detail: &str) {
        self.record(
            parser,
            DiagnosticKind::TitleMissing,
            format!("Skipping fragment without title ({})", detail),
        );
    }

    pub fn unexpected_schema(&mut self, parser: &'static str, error: &TransformError) {
        self.record(
            parser,
            DiagnosticKind::UnexpectedSchema,
            format!("Unexpected raw data schema, parser skipped: {}", error),
        );
    }

    pub fn parser_failed(&mut self, parser: &'static str, error: &TransformError) {
        self.record(
            parser,
            DiagnosticKind::ParserFailed,
            format!("Parser failed, continuing with the next one: {}", error),
        );
    }

    /// Drain a parser's set into records, noting when nothing was found
    pub fn finish(&mut self, parser: &'static str, set: AttributeSet) -> Vec<AttributeRecord> {
        if set.is_empty() {
            self.record(parser, DiagnosticKind::NoAttributes, "No attributes found");
        }
        set.into_records()
    }
}

// ============================================================================
// NORMALIZATION HELPERS
// ============================================================================

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d*\.?\d*$").expect("number pattern is valid"));
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").expect("digits pattern is valid"));
static BRACKETED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("bracket pattern is valid"));

/// Round half up: 2.5 -> 3, -2.5 -> -2
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// "26,120.50" -> 26121 (round half up)
pub fn num_str_to_int(text: &str) -> std::result::Result<i64, FieldError> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if matches!(cleaned.as_str(), "" | "." | "-" | "-.") || !NUMBER_RE.is_match(&cleaned) {
        return Err(FieldError::InvalidNumber(text.to_string()));
    }

    let parsed: f64 = cleaned
        .parse()
        .map_err(|_| FieldError::InvalidNumber(text.to_string()))?;
    Ok(round_half_up(parsed))
}

/// "$2,540" -> 2540
pub fn price_str_to_int(text: &str) -> std::result::Result<i64, FieldError> {
    let trimmed = text.trim();
    num_str_to_int(trimmed.strip_prefix('$').unwrap_or(trimmed))
}

/// Price from any JSON scalar: integers pass through, decimals round, text is parsed
pub fn price_to_int(value: &Value) -> std::result::Result<i64, FieldError> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(i),
            None => n
                .as_f64()
                .map(round_half_up)
                .ok_or_else(|| FieldError::InvalidNumber(n.to_string())),
        },
        Value::String(s) => price_str_to_int(s),
        other => Err(FieldError::WrongType {
            field: other.to_string(),
            expected: "number or price text",
        }),
    }
}

/// First integer run in free text: "6 Cylinders" -> 6
pub fn digits_to_int(text: &str) -> std::result::Result<i64, FieldError> {
    DIGITS_RE
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| FieldError::InvalidNumber(text.to_string()))
}

/// "LE[1234]" -> "LE"
pub fn remove_bracketed(text: &str) -> String {
    BRACKETED_RE.replace_all(text, "").trim().to_string()
}

// ============================================================================
// JSON PATH HELPERS
// ============================================================================

/// Walk object keys; JSON null counts as absent
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Text field. Numbers are accepted and rendered; other types are malformed.
pub fn text_at(value: &Value, path: &[&str]) -> std::result::Result<Option<String>, FieldError> {
    match lookup(value, path) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(FieldError::WrongType {
            field: path.join("."),
            expected: "string",
        }),
    }
}

/// Price field in whole dollars; blank text counts as absent
pub fn price_at(value: &Value, path: &[&str]) -> std::result::Result<Option<i64>, FieldError> {
    match lookup(value, path) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(price) => price_to_int(price).map(Some),
    }
}

/// Fuel type label mapped onto FuelType; blank counts as absent
pub fn fuel_type_at(value: &Value, path: &[&str]) -> std::result::Result<Option<FuelType>, FieldError> {
    match text_at(value, path)? {
        None => Ok(None),
        Some(text) if text.is_empty() => Ok(None),
        Some(text) => FuelType::from_text(&text)
            .map(Some)
            .ok_or_else(|| FieldError::Unrecognized {
                field: path.join("."),
                value: text,
            }),
    }
}

/// Integer field; text values use their leading integer run
pub fn int_at(value: &Value, path: &[&str]) -> std::result::Result<Option<i64>, FieldError> {
    match lookup(value, path) {
        None => Ok(None),
        Some(Value::String(s)) => digits_to_int(s).map(Some),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(round_half_up))
            .map(Some)
            .ok_or_else(|| FieldError::InvalidNumber(n.to_string())),
        Some(_) => Err(FieldError::WrongType {
            field: path.join("."),
            expected: "integer",
        }),
    }
}

/// List container; absent means empty, any other type is a schema failure
pub fn list_at<'a>(value: &'a Value, path: &[&str], parser: &'static str) -> Result<&'a [Value]> {
    match lookup(value, path) {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(TransformError::schema_shape(
            parser,
            format!("{} is not a list", path.join(".")),
        )),
    }
}

/// Object container; absent means `None`, any other type is a schema failure
pub fn object_at<'a>(
    value: &'a Value,
    path: &[&str],
    parser: &'static str,
) -> Result<Option<&'a Map<String, Value>>> {
    match lookup(value, path) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(TransformError::schema_shape(
            parser,
            format!("{} is not an object", path.join(".")),
        )),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_num_str_to_int() {
        assert_eq!(num_str_to_int("26,120"), Ok(26_120));
        assert_eq!(num_str_to_int(" 42 "), Ok(42));
        assert_eq!(num_str_to_int("2540.5"), Ok(2541), "half rounds up");
        assert_eq!(num_str_to_int("2540.49"), Ok(2540));
        assert_eq!(num_str_to_int("-12.5"), Ok(-12), "negative half rounds toward +inf");
        assert_eq!(num_str_to_int("-2.5"), Ok(-2));
        assert_eq!(num_str_to_int("-2.51"), Ok(-3));
        assert_eq!(num_str_to_int(".5"), Ok(1));
    }

    #[test]
    fn test_num_str_to_int_rejects_garbage() {
        for bad in ["", ".", "-", "-.", "abc", "12a", "1.2.3", "--1"] {
            assert!(num_str_to_int(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_price_helpers() {
        assert_eq!(price_str_to_int("$2,540"), Ok(2540));
        assert_eq!(price_str_to_int(" $0 "), Ok(0));
        assert_eq!(price_to_int(&json!(395)), Ok(395));
        assert_eq!(price_to_int(&json!(394.5)), Ok(395));
        assert_eq!(price_to_int(&json!("$1,234.99")), Ok(1235));
        assert!(price_to_int(&json!("Call for price")).is_err());
        assert!(price_to_int(&json!(true)).is_err());
    }

    #[test]
    fn test_digits_to_int() {
        assert_eq!(digits_to_int("6 Cylinders"), Ok(6));
        assert_eq!(digits_to_int("V8"), Ok(8));
        assert_eq!(digits_to_int("Seats 7 people"), Ok(7));
        assert!(digits_to_int("none").is_err());
    }

    #[test]
    fn test_remove_bracketed() {
        assert_eq!(remove_bracketed("LE[1234]"), "LE");
        assert_eq!(remove_bracketed("2.5L 4-Cyl [A25A] Engine"), "2.5L 4-Cyl  Engine");
        assert_eq!(remove_bracketed("  Plain  "), "Plain");
    }

    #[test]
    fn test_lookup_treats_null_as_absent() {
        let doc = json!({"engine": {"title": null, "code": "A25A"}});
        assert!(lookup(&doc, &["engine", "title"]).is_none());
        assert_eq!(lookup(&doc, &["engine", "code"]), Some(&json!("A25A")));
        assert!(lookup(&doc, &["engine", "code", "deeper"]).is_none());
    }

    #[test]
    fn test_field_helpers() {
        let doc = json!({"price": "$1,000", "seats": "8 passengers", "name": 12, "flag": [1]});
        assert_eq!(price_at(&doc, &["price"]), Ok(Some(1000)));
        assert_eq!(price_at(&doc, &["missing"]), Ok(None));
        assert_eq!(price_at(&json!({"price": " "}), &["price"]), Ok(None));
        assert_eq!(int_at(&doc, &["seats"]), Ok(Some(8)));
        assert_eq!(text_at(&doc, &["name"]), Ok(Some("12".to_string())));
        assert!(text_at(&doc, &["flag"]).is_err());
    }

    #[test]
    fn test_container_helpers() {
        let doc = json!({"model": [{"title": "Camry"}], "config": "broken"});
        assert_eq!(list_at(&doc, &["model"], "TestParser").unwrap().len(), 1);
        assert!(list_at(&doc, &["absent"], "TestParser").unwrap().is_empty());

        let err = list_at(&doc, &["config"], "TestParser").unwrap_err();
        assert!(err.is_recoverable());
        assert!(object_at(&doc, &["config"], "TestParser").is_err());
        assert!(object_at(&doc, &["absent"], "TestParser").unwrap().is_none());
    }

    #[test]
    fn test_context_records_field_failures() {
        let mut ctx = ParseContext::new("2024 - Toyota Camry");
        let price: Option<i64> = ctx.field("TestParser", "msrp", Err(FieldError::InvalidNumber("TBD".into())));
        let absent: Option<i64> = ctx.field("TestParser", "msrp", Ok(None));

        assert!(price.is_none());
        assert!(absent.is_none());
        assert_eq!(ctx.diagnostics().len(), 1, "only malformed values are recorded");
        assert_eq!(ctx.diagnostics()[0].kind, DiagnosticKind::FieldParse);
        assert_eq!(ctx.diagnostics()[0].severity, Severity::Debug);
    }

    #[test]
    fn test_context_finish_notes_empty_sets() {
        let mut ctx = ParseContext::new("Unknown");
        let records = ctx.finish("TestParser", AttributeSet::fill_missing());
        assert!(records.is_empty());
        assert_eq!(ctx.diagnostics()[0].kind, DiagnosticKind::NoAttributes);
    }
}
