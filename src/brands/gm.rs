// 🚗 GM parsers (Buick, Cadillac, Chevrolet, GMC)
// Data comes from two roots: `config.*` (accessories, options, colors, packages)
// and `modelMatrix.*` (body types, drives, engines, transmissions).
// GM does not list the same product twice, so there is no post-pass.

use super::{fallback_identifier, fragment_title, price_entry};
use crate::attributes::{AttributeCategory, AttributeRecord, FuelType, MetadataEntry, MetadataType, MetadataUnit};
use crate::error::{Result, TransformError};
use crate::parser::{list_at, lookup, num_str_to_int, object_at, AttributeParser, ParseContext};
use crate::reconciliation::{AttributeSet, PriceUpdater};
use crate::transformer::{BrandTransformer, DiagnosticKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const MANUFACTURER: &str = "GM";
pub const BRAND_NAMES: [&str; 4] = ["Buick", "Cadillac", "Chevrolet", "GMC"];

static HORSEPOWER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(\.\d)?)\s?hp").expect("horsepower pattern is valid"));
static DISPLACEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d(\.\d)?L").expect("displacement pattern is valid"));
static DIESEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)diesel").expect("diesel pattern is valid"));
static ELECTRIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)electric").expect("electric pattern is valid"));

pub fn gm_transformer() -> BrandTransformer {
    BrandTransformer::new(MANUFACTURER, BRAND_NAMES.to_vec(), model_identifier)
        .with_parser(CategorizedParser::accessories())
        .with_parser(BodyStyleParser)
        .with_parser(ColorParser::interior())
        .with_parser(ColorParser::exterior())
        .with_parser(PricedListParser::drives())
        .with_parser(EngineParser)
        .with_parser(CategorizedParser::options())
        .with_parser(PricedListParser::packages())
        .with_parser(PricedListParser::transmissions())
}

/// "{year} - {make} {model}" from `config.vsParams`
pub fn model_identifier(document: &Value) -> String {
    let params = match lookup(document, &["config", "vsParams"]).and_then(Value::as_array) {
        Some(params) => params,
        None => return fallback_identifier(document),
    };

    let param = |wanted: &str| {
        params.iter().find_map(|p| {
            let name = lookup(p, &["name"])?.as_str()?;
            if name != wanted {
                return None;
            }
            match lookup(p, &["value"])? {
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }
        })
    };

    match (param("years"), param("makes"), param("models")) {
        (Some(year), Some(make), Some(model)) => format!("{} - {} {}", year, make, model),
        _ => fallback_identifier(document),
    }
}

/// "exterior.safety" -> "Exterior - Safety"
fn category_name(category_id: &str) -> String {
    if category_id.trim().is_empty() {
        return "Miscellaneous".to_string();
    }
    let mut name = String::with_capacity(category_id.len() + 4);
    let mut previous_alpha = false;
    for c in category_id.replace('.', " - ").chars() {
        if c.is_alphabetic() {
            if previous_alpha {
                name.extend(c.to_lowercase());
            } else {
                name.extend(c.to_uppercase());
            }
            previous_alpha = true;
        } else {
            name.push(c);
            previous_alpha = false;
        }
    }
    name
}

fn price_policy(metadata_type: MetadataType) -> PriceUpdater {
    match metadata_type {
        MetadataType::CommonBaseMsrp => PriceUpdater::lowest(metadata_type),
        _ => PriceUpdater::highest(metadata_type),
    }
}

// ============================================================================
// FLAT PRICED LISTS (drive, package, transmission)
// ============================================================================

/// A list of `{title_key, price_key}` objects at a fixed path
pub struct PricedListParser {
    name: &'static str,
    category: AttributeCategory,
    path: &'static [&'static str],
    title_key: &'static str,
    price_key: &'static str,
    price_type: MetadataType,
}

impl PricedListParser {
    pub fn drives() -> Self {
        PricedListParser {
            name: "GmDriveParser",
            category: AttributeCategory::Drive,
            path: &["modelMatrix", "driveTypes"],
            title_key: "id",
            price_key: "lowestMSRP",
            price_type: MetadataType::CommonBaseMsrp,
        }
    }

    pub fn packages() -> Self {
        PricedListParser {
            name: "GmPackageParser",
            category: AttributeCategory::Package,
            path: &["config", "OPTIONS", "PACKAGES", "more"],
            title_key: "description",
            price_key: "msrp",
            price_type: MetadataType::CommonMsrp,
        }
    }

    pub fn transmissions() -> Self {
        PricedListParser {
            name: "GmTransmissionParser",
            category: AttributeCategory::Transmission,
            path: &["modelMatrix", "transmission"],
            title_key: "primaryName",
            price_key: "msrp",
            price_type: MetadataType::CommonMsrp,
        }
    }
}

impl AttributeParser for PricedListParser {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> AttributeCategory {
        self.category
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let mut found = AttributeSet::new(price_policy(self.price_type));

        for item in list_at(document, self.path, self.name)? {
            let title = match fragment_title(ctx, self.name, item, &[self.title_key]) {
                Some(title) => title,
                None => continue,
            };
            let price = price_entry(ctx, self.name, item, &[self.price_key], self.price_type);
            found.add(AttributeRecord::new(self.category, title).with_metadata(price.into_iter().collect()))?;
        }

        Ok(ctx.finish(self.name, found))
    }
}

// ============================================================================
// CATEGORIZED MAPS (accessories, options)
// ============================================================================

/// `{categoryId: [{title_key, msrp}]}` maps; the category id becomes metadata
pub struct CategorizedParser {
    name: &'static str,
    category: AttributeCategory,
    roots: &'static [&'static [&'static str]],
    title_key: &'static str,
    category_type: MetadataType,
}

impl CategorizedParser {
    pub fn accessories() -> Self {
        CategorizedParser {
            name: "GmAccessoryParser",
            category: AttributeCategory::Accessory,
            roots: &[&["config", "ACCESSORIES"]],
            title_key: "primaryName",
            category_type: MetadataType::AccessoryCategory,
        }
    }

    pub fn options() -> Self {
        CategorizedParser {
            name: "GmOptionParser",
            category: AttributeCategory::Option,
            roots: &[&["config", "OPTIONS", "EXTERIOR"], &["config", "OPTIONS", "INTERIOR"]],
            title_key: "description",
            category_type: MetadataType::CommonCategory,
        }
    }

    fn label(&self, category_id: &str) -> String {
        match self.category_type {
            MetadataType::CommonCategory => category_name(category_id),
            _ => category_id.to_string(),
        }
    }
}

impl AttributeParser for CategorizedParser {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> AttributeCategory {
        self.category
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let mut found = AttributeSet::new(PriceUpdater::highest(MetadataType::CommonMsrp));

        for root in self.roots {
            let categories = match object_at(document, root, self.name)? {
                Some(categories) => categories,
                None => continue,
            };

            for (category_id, items) in categories {
                let items = match items {
                    Value::Array(items) => items,
                    Value::Null => continue,
                    _ => {
                        return Err(TransformError::schema_shape(
                            self.name,
                            format!("{}.{} is not a list", root.join("."), category_id),
                        ))
                    }
                };
                let label = self.label(category_id);

                for item in items {
                    let title = match fragment_title(ctx, self.name, item, &[self.title_key]) {
                        Some(title) => title,
                        None => continue,
                    };
                    let category = MetadataEntry::new(self.category_type, label.as_str());
                    let price = price_entry(ctx, self.name, item, &["msrp"], MetadataType::CommonMsrp);

                    let metadata = std::iter::once(category).chain(price).collect();
                    found.add(AttributeRecord::new(self.category, title).with_metadata(metadata))?;
                }
            }
        }

        Ok(ctx.finish(self.name, found))
    }
}

// ============================================================================
// COLORS
// ============================================================================

/// `config.OPTIONS.COLOR.<side>[] {items: [{primaryName, msrp}]}`
pub struct ColorParser {
    name: &'static str,
    category: AttributeCategory,
    side: &'static str,
}

impl ColorParser {
    pub fn interior() -> Self {
        ColorParser {
            name: "GmInteriorColorParser",
            category: AttributeCategory::InteriorColor,
            side: "interior",
        }
    }

    pub fn exterior() -> Self {
        ColorParser {
            name: "GmExteriorColorParser",
            category: AttributeCategory::ExteriorColor,
            side: "exterior",
        }
    }
}

impl AttributeParser for ColorParser {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> AttributeCategory {
        self.category
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let mut colors = AttributeSet::new(PriceUpdater::highest(MetadataType::CommonMsrp));

        for group in list_at(document, &["config", "OPTIONS", "COLOR", self.side], self.name)? {
            for color in list_at(group, &["items"], self.name)? {
                let title = match fragment_title(ctx, self.name, color, &["primaryName"]) {
                    Some(title) => title,
                    None => continue,
                };
                let price = price_entry(ctx, self.name, color, &["msrp"], MetadataType::CommonMsrp);
                colors.add(AttributeRecord::new(self.category, title).with_metadata(price.into_iter().collect()))?;
            }
        }

        Ok(ctx.finish(self.name, colors))
    }
}

// ============================================================================
// BODY STYLE
// ============================================================================

/// GM "body type" maps onto BodyStyle
pub struct BodyStyleParser;

impl AttributeParser for BodyStyleParser {
    fn name(&self) -> &'static str {
        "GmBodyStyleParser"
    }

    fn category(&self) -> AttributeCategory {
        AttributeCategory::BodyStyle
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let name = self.name();
        let mut body_styles = AttributeSet::new(PriceUpdater::lowest(MetadataType::CommonBaseMsrp));

        for body_type in list_at(document, &["modelMatrix", "bodyTypes"], name)? {
            let base_msrp = price_entry(ctx, name, body_type, &["lowestMSRPValue"], MetadataType::CommonBaseMsrp);
            let title = match (fragment_title(ctx, name, body_type, &["formattedConfig"]), &base_msrp) {
                (Some(title), _) => title,
                (None, Some(_)) => "Standard".to_string(),
                (None, None) => continue,
            };
            body_styles.add(AttributeRecord::new(self.category(), title).with_metadata(base_msrp.into_iter().collect()))?;
        }

        if body_styles.is_empty() {
            ctx.record(name, DiagnosticKind::NoAttributes, "No body styles found, using Standard");
            body_styles.add(AttributeRecord::new(self.category(), "Standard"))?;
        }
        Ok(body_styles.into_records())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct EngineParser;

impl EngineParser {
    /// Horsepower appears in either description, not consistently
    fn horsepower(ctx: &mut ParseContext, name: &'static str, engine: &Value) -> Option<MetadataEntry> {
        let found = ["extendedCFD", "longCFD"]
            .into_iter()
            .filter_map(|key| lookup(engine, &[key]).and_then(Value::as_str))
            .find_map(|text| HORSEPOWER_RE.captures(text))
            .and_then(|captures| captures.get(1))
            .map(|hp| num_str_to_int(hp.as_str()));

        ctx.field(name, "horsepower", found.transpose())
            .map(|hp| MetadataEntry::new(MetadataType::EngineHorsepower, hp).with_unit(MetadataUnit::Horsepower))
    }

    /// Displacement in the name means combustion; "electric" in the description means EV
    fn fuel_type(engine: &Value) -> Option<FuelType> {
        let primary_name = lookup(engine, &["primaryName"]).and_then(Value::as_str).unwrap_or("");
        let description = lookup(engine, &["description"]).and_then(Value::as_str).unwrap_or("");

        if DISPLACEMENT_RE.is_match(primary_name) {
            if DIESEL_RE.is_match(primary_name) {
                Some(FuelType::Diesel)
            } else {
                Some(FuelType::Gasoline)
            }
        } else if ELECTRIC_RE.is_match(description) {
            Some(FuelType::Electric)
        } else {
            None
        }
    }
}

impl AttributeParser for EngineParser {
    fn name(&self) -> &'static str {
        "GmEngineParser"
    }

    fn category(&self) -> AttributeCategory {
        AttributeCategory::Engine
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let name = self.name();
        let mut engines = AttributeSet::new(PriceUpdater::highest(MetadataType::CommonMsrp));

        for engine in list_at(document, &["modelMatrix", "engine"], name)? {
            // shortCFD over primaryName: primaryName is sparse for electric vehicles
            let title = match fragment_title(ctx, name, engine, &["shortCFD"]) {
                Some(title) => title,
                None => continue,
            };

            let fuel_type = Self::fuel_type(engine).map(|f| MetadataEntry::new(MetadataType::EngineFuelType, f));
            let horsepower = Self::horsepower(ctx, name, engine);
            let price = price_entry(ctx, name, engine, &["msrp"], MetadataType::CommonMsrp);

            let metadata = [fuel_type, horsepower, price].into_iter().flatten().collect();
            engines.add(AttributeRecord::new(self.category(), title).with_metadata(metadata))?;
        }

        Ok(ctx.finish(name, engines))
    }
}

// ============================================================================
// TESTS
// ============================================================================
