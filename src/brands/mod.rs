// 🏷️ Brand parser families
// Toyota (Toyota, Lexus) and GM (Buick, Cadillac, Chevrolet, GMC)

pub mod gm;
pub mod toyota;

use crate::attributes::{MetadataEntry, MetadataType};
use crate::parser::{price_at, text_at, ParseContext};
use crate::transformer::Transformer;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub use gm::gm_transformer;
pub use toyota::toyota_transformer;

/// Every transformer this crate ships, in registration order
pub fn default_transformers() -> Vec<Box<dyn Transformer>> {
    vec![Box::new(toyota_transformer()), Box::new(gm_transformer())]
}

// ============================================================================
// SHARED FRAGMENT HELPERS
// ============================================================================

/// Non-empty title at `path`, recording a diagnostic when there is none
pub(crate) fn fragment_title(
    ctx: &mut ParseContext,
    parser: &'static str,
    fragment: &Value,
    path: &[&str],
) -> Option<String> {
    match text_at(fragment, path) {
        Ok(Some(title)) if !title.is_empty() => Some(title),
        Ok(_) => {
            ctx.title_missing(parser, &path.join("."));
            None
        }
        Err(err) => ctx.field::<String>(parser, &path.join("."), Err(err)),
    }
}

/// Whole-dollar price entry
pub(crate) fn price_entry(
    ctx: &mut ParseContext,
    parser: &'static str,
    fragment: &Value,
    path: &[&str],
    metadata_type: MetadataType,
) -> Option<MetadataEntry> {
    ctx.field(parser, &path.join("."), price_at(fragment, path))
        .map(|price| MetadataEntry::dollars(metadata_type, price))
}

/// Non-empty text entry
pub(crate) fn text_entry(
    ctx: &mut ParseContext,
    parser: &'static str,
    fragment: &Value,
    path: &[&str],
    metadata_type: MetadataType,
) -> Option<MetadataEntry> {
    ctx.field(parser, &path.join("."), text_at(fragment, path))
        .filter(|text| !text.is_empty())
        .map(|text| MetadataEntry::new(metadata_type, text))
}

/// Stable label for documents that carry no readable model name
pub(crate) fn fallback_identifier(document: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.to_string());
    let digest = format!("{:x}", hasher.finalize());
    format!("Unknown - {}", &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::DiagnosticKind;
    use serde_json::json;

    #[test]
    fn test_default_transformers_cover_all_brands() {
        let transformers = default_transformers();
        for brand in ["Toyota", "Lexus", "Buick", "Cadillac", "Chevrolet", "GMC"] {
            let count = transformers.iter().filter(|t| t.can_transform(brand)).count();
            assert_eq!(count, 1, "{} should map to exactly one transformer", brand);
        }
    }

    #[test]
    fn test_fragment_title_records_missing() {
        let mut ctx = ParseContext::new("test");
        let fragment = json!({"title": "  ", "name": "Cargo Net"});

        assert_eq!(fragment_title(&mut ctx, "TestParser", &fragment, &["name"]), Some("Cargo Net".to_string()));
        assert_eq!(fragment_title(&mut ctx, "TestParser", &fragment, &["title"]), None);
        assert_eq!(fragment_title(&mut ctx, "TestParser", &fragment, &["absent"]), None);
        assert_eq!(ctx.diagnostics().len(), 2);
        assert!(ctx.diagnostics().iter().all(|d| d.kind == DiagnosticKind::TitleMissing));
    }

    #[test]
    fn test_fallback_identifier_is_stable() {
        let doc = json!({"a": 1});
        assert_eq!(fallback_identifier(&doc), fallback_identifier(&json!({"a": 1})));
        assert!(fallback_identifier(&doc).starts_with("Unknown - "));
        assert_ne!(fallback_identifier(&doc), fallback_identifier(&json!({"a": 2})));
    }
}
