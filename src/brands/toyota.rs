// 🚙 Toyota / Lexus parsers
// Every category is read from the `model[]` list; one entry per trim configuration.

use super::{fallback_identifier, fragment_title, price_entry, text_entry};
use crate::attributes::{AttributeCategory, AttributeRecord, MetadataEntry, MetadataType, MetadataUnit};
use crate::error::Result;
use crate::parser::{fuel_type_at, int_at, list_at, lookup, remove_bracketed, text_at, AttributeParser, ParseContext};
use crate::reconciliation::{AttributeSet, PriceUpdater};
use crate::transformer::{dedupe_accessories_and_packages, BrandTransformer, DiagnosticKind};
use serde_json::Value;

pub const MANUFACTURER: &str = "Toyota";
pub const BRAND_NAMES: [&str; 2] = ["Toyota", "Lexus"];

/// Toyota transformer with the Accessory/Package post-pass
pub fn toyota_transformer() -> BrandTransformer {
    BrandTransformer::new(MANUFACTURER, BRAND_NAMES.to_vec(), model_identifier)
        .with_parser(EngineParser)
        .with_parser(TitleParser::transmission())
        .with_parser(TitleParser::drive())
        .with_parser(BodyStyleParser)
        .with_parser(GradeParser)
        .with_parser(PricedItemParser::packages())
        .with_parser(PricedItemParser::interior_colors())
        .with_parser(PricedItemParser::exterior_colors())
        .with_parser(AccessoryParser)
        .with_post_pass(dedupe_accessories_and_packages)
}

/// First model title, e.g. "Camry"
pub fn model_identifier(document: &Value) -> String {
    lookup(document, &["model"])
        .and_then(Value::as_array)
        .and_then(|models| {
            models
                .iter()
                .filter_map(|m| lookup(m, &["title"]).and_then(Value::as_str))
                .map(str::trim)
                .find(|title| !title.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| fallback_identifier(document))
}

fn models<'a>(document: &'a Value, parser: &'static str) -> Result<&'a [Value]> {
    list_at(document, &["model"], parser)
}

/// Bracket-stripped title; a title that is only a code counts as missing
fn clean_title(ctx: &mut ParseContext, parser: &'static str, fragment: &Value, path: &[&str]) -> Option<String> {
    let title = remove_bracketed(&fragment_title(ctx, parser, fragment, path)?);
    if title.is_empty() {
        ctx.title_missing(parser, &path.join("."));
        return None;
    }
    Some(title)
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct EngineParser;

impl AttributeParser for EngineParser {
    fn name(&self) -> &'static str {
        "ToyotaEngineParser"
    }

    fn category(&self) -> AttributeCategory {
        AttributeCategory::Engine
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let name = self.name();
        let mut engines = AttributeSet::fill_missing();

        for model in models(document, name)? {
            let title = match clean_title(ctx, name, model, &["engine", "title"]) {
                Some(title) => title,
                None => continue,
            };

            let cylinders = ctx
                .field(name, "attributes.cylinders.value", int_at(model, &["attributes", "cylinders", "value"]))
                .map(|c| MetadataEntry::new(MetadataType::EngineCylinders, c));
            let fuel_type = ctx
                .field(name, "attributes.fueltype.value", fuel_type_at(model, &["attributes", "fueltype", "value"]))
                .map(|fuel| MetadataEntry::new(MetadataType::EngineFuelType, fuel));
            let horsepower = ctx
                .field(name, "attributes.horsepower.value", int_at(model, &["attributes", "horsepower", "value"]))
                .map(|hp| MetadataEntry::new(MetadataType::EngineHorsepower, hp).with_unit(MetadataUnit::Horsepower));

            let metadata = [cylinders, fuel_type, horsepower].into_iter().flatten().collect();
            engines.add(AttributeRecord::new(self.category(), title).with_metadata(metadata))?;
        }

        Ok(ctx.finish(name, engines))
    }
}

// ============================================================================
// TRANSMISSION / DRIVE
// ============================================================================

/// Title-only category read from `model[].<key>.title`
pub struct TitleParser {
    name: &'static str,
    category: AttributeCategory,
    key: &'static str,
}

impl TitleParser {
    pub fn transmission() -> Self {
        TitleParser {
            name: "ToyotaTransmissionParser",
            category: AttributeCategory::Transmission,
            key: "transmission",
        }
    }

    pub fn drive() -> Self {
        TitleParser {
            name: "ToyotaDriveParser",
            category: AttributeCategory::Drive,
            key: "drive",
        }
    }
}

impl AttributeParser for TitleParser {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> AttributeCategory {
        self.category
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let mut found = AttributeSet::fill_missing();
        for model in models(document, self.name)? {
            if let Some(title) = clean_title(ctx, self.name, model, &[self.key, "title"]) {
                found.add(AttributeRecord::new(self.category, title))?;
            }
        }
        Ok(ctx.finish(self.name, found))
    }
}

// ============================================================================
// BODY STYLE
// ============================================================================

/// Toyota has no body style field; the title is built from cab and bed
pub struct BodyStyleParser;

impl AttributeParser for BodyStyleParser {
    fn name(&self) -> &'static str {
        "ToyotaBodyStyleParser"
    }

    fn category(&self) -> AttributeCategory {
        AttributeCategory::BodyStyle
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let name = self.name();
        let mut body_styles = AttributeSet::new(PriceUpdater::lowest(MetadataType::CommonBaseMsrp));

        for model in models(document, name)? {
            let base_msrp = price_entry(ctx, name, model, &["attributes", "msrp", "value"], MetadataType::CommonBaseMsrp);
            let seating = ctx
                .field(name, "attributes.seating.value", int_at(model, &["attributes", "seating", "value"]))
                .map(|s| MetadataEntry::new(MetadataType::BodyStyleSeating, s).with_unit(MetadataUnit::Passengers));
            let cab = text_entry(ctx, name, model, &["cab", "title"], MetadataType::BodyStyleCab);
            let bed = text_entry(ctx, name, model, &["bed", "title"], MetadataType::BodyStyleBed);

            let parts: Vec<String> = [&cab, &bed]
                .into_iter()
                .flatten()
                .filter_map(|entry| entry.value.as_ref().map(|v| v.to_string()))
                .collect();
            let title = if parts.is_empty() {
                "Standard".to_string()
            } else {
                parts.join(" ")
            };

            let metadata = [base_msrp, seating, cab, bed].into_iter().flatten().collect();
            body_styles.add(AttributeRecord::new(self.category(), title).with_metadata(metadata))?;
        }

        if body_styles.is_empty() {
            ctx.record(name, DiagnosticKind::NoAttributes, "No body styles found, using Standard");
            body_styles.add(AttributeRecord::new(self.category(), "Standard"))?;
        }
        Ok(body_styles.into_records())
    }
}

// ============================================================================
// GRADE
// ============================================================================

pub struct GradeParser;

impl GradeParser {
    /// grade title -> dealer trim (Lexus) -> "Standard"
    fn title(ctx: &mut ParseContext, name: &'static str, model: &Value) -> String {
        let explicit = [
            &["grade", "attributes", "title", "value"][..],
            &["attributes", "dealertrim", "value"][..],
        ]
        .into_iter()
        .find_map(|path| {
            let path_name = path.join(".");
            ctx.field(name, &path_name, text_at(model, path))
                .filter(|t| !t.is_empty())
        });
        explicit.unwrap_or_else(|| "Standard".to_string())
    }
}

impl AttributeParser for GradeParser {
    fn name(&self) -> &'static str {
        "ToyotaGradeParser"
    }

    fn category(&self) -> AttributeCategory {
        AttributeCategory::Grade
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let name = self.name();
        let mut grades = AttributeSet::new(PriceUpdater::lowest(MetadataType::CommonBaseMsrp));

        for model in models(document, name)? {
            let title = remove_bracketed(&Self::title(ctx, name, model));
            if title.is_empty() {
                ctx.title_missing(name, "grade");
                continue;
            }
            let base_msrp = price_entry(ctx, name, model, &["attributes", "msrp", "value"], MetadataType::CommonBaseMsrp);
            grades.add(AttributeRecord::new(self.category(), title).with_metadata(base_msrp.into_iter().collect()))?;
        }

        if grades.is_empty() {
            ctx.record(name, DiagnosticKind::NoAttributes, "No grades found, using Standard");
            grades.add(AttributeRecord::new(self.category(), "Standard"))?;
        }
        Ok(grades.into_records())
    }
}

// ============================================================================
// PACKAGES / COLORS
// ============================================================================

/// `model[].<key>[] {title, price}`, keeping the highest MSRP
pub struct PricedItemParser {
    name: &'static str,
    category: AttributeCategory,
    key: &'static str,
}

impl PricedItemParser {
    pub fn packages() -> Self {
        PricedItemParser {
            name: "ToyotaPackageParser",
            category: AttributeCategory::Package,
            key: "packages",
        }
    }

    pub fn interior_colors() -> Self {
        PricedItemParser {
            name: "ToyotaInteriorColorParser",
            category: AttributeCategory::InteriorColor,
            key: "interiorcolor",
        }
    }

    pub fn exterior_colors() -> Self {
        PricedItemParser {
            name: "ToyotaExteriorColorParser",
            category: AttributeCategory::ExteriorColor,
            key: "exteriorcolor",
        }
    }
}

impl AttributeParser for PricedItemParser {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> AttributeCategory {
        self.category
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let mut items = AttributeSet::new(PriceUpdater::highest(MetadataType::CommonMsrp));

        for model in models(document, self.name)? {
            for item in list_at(model, &[self.key], self.name)? {
                let title = match clean_title(ctx, self.name, item, &["title"]) {
                    Some(title) => title,
                    None => continue,
                };
                let price = price_entry(ctx, self.name, item, &["price"], MetadataType::CommonMsrp);
                items.add(AttributeRecord::new(self.category, title).with_metadata(price.into_iter().collect()))?;
            }
        }

        Ok(ctx.finish(self.name, items))
    }
}

// ============================================================================
// ACCESSORY
// ============================================================================

pub struct AccessoryParser;

impl AccessoryParser {
    /// `group` (text or list) with `attributes.group.value` as fallback
    fn group(ctx: &mut ParseContext, name: &'static str, accessory: &Value) -> Option<MetadataEntry> {
        let direct = match lookup(accessory, &["group"]) {
            Some(Value::String(group)) => Some(group.trim()),
            Some(Value::Array(groups)) => groups.iter().find_map(Value::as_str).map(str::trim),
            _ => None,
        };
        match direct {
            Some(group) if !group.is_empty() => Some(MetadataEntry::new(MetadataType::AccessoryCategory, group)),
            _ => text_entry(ctx, name, accessory, &["attributes", "group", "value"], MetadataType::AccessoryCategory),
        }
    }
}

impl AttributeParser for AccessoryParser {
    fn name(&self) -> &'static str {
        "ToyotaAccessoryParser"
    }

    fn category(&self) -> AttributeCategory {
        AttributeCategory::Accessory
    }

    fn parse(&self, document: &Value, ctx: &mut ParseContext) -> Result<Vec<AttributeRecord>> {
        let name = self.name();
        let mut accessories = AttributeSet::new(PriceUpdater::highest(MetadataType::CommonMsrp));

        for model in models(document, name)? {
            for accessory in list_at(model, &["accessories"], name)? {
                let title = match clean_title(ctx, name, accessory, &["title"]) {
                    Some(title) => title,
                    None => continue,
                };
                let price = price_entry(ctx, name, accessory, &["price"], MetadataType::CommonMsrp);
                let group = Self::group(ctx, name, accessory);

                let metadata = [price, group].into_iter().flatten().collect();
                accessories.add(AttributeRecord::new(self.category(), title).with_metadata(metadata))?;
            }
        }

        Ok(ctx.finish(name, accessories))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{FuelType, MetadataValue};
    use crate::transformer::Transformer;
    use serde_json::json;

    fn parse_with(parser: &dyn AttributeParser, document: &Value) -> (Vec<AttributeRecord>, ParseContext) {
        let mut ctx = ParseContext::new("test");
        let records = parser.parse(document, &mut ctx).unwrap();
        (records, ctx)
    }

    #[test]
    fn test_grade_keeps_lowest_starting_price() {
        let doc = json!({"model": [
            {"grade": {"attributes": {"title": {"value": "LE"}}}, "attributes": {"msrp": {"value": "$26,220"}}},
            {"grade": {"attributes": {"title": {"value": "LE"}}}, "attributes": {"msrp": {"value": "$26,120"}}}
        ]});
        let (grades, _) = parse_with(&GradeParser, &doc);

        assert_eq!(grades.len(), 1);
        let expected = AttributeRecord::new(AttributeCategory::Grade, "LE")
            .with_entry(MetadataEntry::dollars(MetadataType::CommonBaseMsrp, 26_120));
        assert!(grades[0].strict_eq(&expected), "got {}", grades[0]);
    }

    #[test]
    fn test_grade_title_fallback_chain() {
        let doc = json!({"model": [
            {"grade": {"attributes": {"title": {"value": "XLE[0123]"}}}},
            {"attributes": {"dealertrim": {"value": "F Sport"}}},
            {"grade": {"attributes": {"title": {"value": ""}}}, "attributes": {"dealertrim": {"value": null}}}
        ]});
        let (grades, _) = parse_with(&GradeParser, &doc);

        let titles: Vec<&str> = grades.iter().map(|g| g.title()).collect();
        assert_eq!(titles, vec!["XLE", "F Sport", "Standard"]);
    }

    #[test]
    fn test_grade_defaults_to_standard_without_models() {
        let (grades, ctx) = parse_with(&GradeParser, &json!({"other": true}));
        assert_eq!(grades, vec![AttributeRecord::new(AttributeCategory::Grade, "Standard")]);
        assert_eq!(ctx.diagnostics()[0].kind, DiagnosticKind::NoAttributes);
    }

    #[test]
    fn test_accessory_with_price_and_group() {
        let doc = json!({"model": [{"accessories": [
            {"title": "Touring Package", "price": "$2,540", "group": "Exterior"}
        ]}]});
        let (accessories, _) = parse_with(&AccessoryParser, &doc);

        let expected = AttributeRecord::new(AttributeCategory::Accessory, "Touring Package").with_metadata(vec![
            MetadataEntry::dollars(MetadataType::CommonMsrp, 2540),
            MetadataEntry::new(MetadataType::AccessoryCategory, "Exterior"),
        ]);
        assert_eq!(accessories.len(), 1);
        assert!(accessories[0].strict_eq(&expected), "got {}", accessories[0]);
    }

    #[test]
    fn test_accessory_group_from_attributes() {
        let doc = json!({"model": [{"accessories": [
            {"title": "Cargo Net", "price": null, "attributes": {"group": {"value": "Interior"}}},
            {"title": "Mudguards", "price": null, "attributes": {"group": {"value": null}}},
            {"title": null},
            {}
        ]}, {}]});
        let (accessories, ctx) = parse_with(&AccessoryParser, &doc);

        assert_eq!(accessories.len(), 2);
        assert_eq!(
            accessories[0].metadata_value(MetadataType::AccessoryCategory),
            Some(&MetadataValue::Text("Interior".to_string()))
        );
        assert!(!accessories[1].has_metadata());
        assert_eq!(ctx.diagnostics().iter().filter(|d| d.kind == DiagnosticKind::TitleMissing).count(), 2);
    }

    #[test]
    fn test_accessory_keeps_highest_price() {
        let doc = json!({"model": [
            {"accessories": [{"title": "Roof Rack", "price": "$300"}]},
            {"accessories": [{"title": "Roof Rack", "price": "$450"}]},
            {"accessories": [{"title": "Roof Rack"}]}
        ]});
        let (accessories, _) = parse_with(&AccessoryParser, &doc);
        assert_eq!(
            accessories[0].metadata_value(MetadataType::CommonMsrp),
            Some(&MetadataValue::Integer(450))
        );
    }

    #[test]
    fn test_bad_price_keeps_title() {
        let doc = json!({"model": [{"packages": [{"title": "Premium Package", "price": "TBD"}]}]});
        let (packages, ctx) = parse_with(&PricedItemParser::packages(), &doc);

        assert_eq!(packages, vec![AttributeRecord::new(AttributeCategory::Package, "Premium Package")]);
        assert!(!packages[0].has_metadata());
        assert_eq!(ctx.diagnostics()[0].kind, DiagnosticKind::FieldParse);
    }

    #[test]
    fn test_engine_metadata() {
        let doc = json!({"model": [{
            "engine": {"title": "2.5L 4-Cyl[A25A]"},
            "attributes": {
                "cylinders": {"value": "4 Cylinders"},
                "fueltype": {"value": "Gas"},
                "horsepower": {"value": "203 hp"}
            }
        }]});
        let (engines, _) = parse_with(&EngineParser, &doc);

        let expected = AttributeRecord::new(AttributeCategory::Engine, "2.5L 4-Cyl").with_metadata(vec![
            MetadataEntry::new(MetadataType::EngineCylinders, 4),
            MetadataEntry::new(MetadataType::EngineFuelType, "Gasoline"),
            MetadataEntry::new(MetadataType::EngineHorsepower, 203).with_unit(MetadataUnit::Horsepower),
        ]);
        assert!(engines[0].strict_eq(&expected), "got {}", engines[0]);
    }

    #[test]
    fn test_engine_fuel_type_labels() {
        let cases = [
            ("Battery Electric", FuelType::Electric),
            ("Fuel Cell", FuelType::FuelCell),
            ("Gas", FuelType::Gasoline),
            ("Plug-in Hybrid", FuelType::PlugInHybrid),
            ("Hybrid", FuelType::Hybrid),
        ];
        for (label, fuel) in cases {
            let doc = json!({"model": [{
                "engine": {"title": "Engine"},
                "attributes": {"fueltype": {"value": label}}
            }]});
            let (engines, _) = parse_with(&EngineParser, &doc);
            assert_eq!(
                engines[0].metadata_value(MetadataType::EngineFuelType),
                Some(&MetadataValue::from(fuel)),
                "{} should map to {}",
                label,
                fuel.as_str()
            );
        }
    }

    #[test]
    fn test_engine_unrecognized_fuel_type_is_skipped() {
        let doc = json!({"model": [{
            "engine": {"title": "Engine"},
            "attributes": {"fueltype": {"value": "Nuclear Fusion"}, "horsepower": {"value": "300 hp"}}
        }]});
        let (engines, ctx) = parse_with(&EngineParser, &doc);

        assert_eq!(engines.len(), 1, "unknown fuel must not drop the engine");
        assert!(engines[0].metadata_value(MetadataType::EngineFuelType).is_none());
        assert!(engines[0].metadata_value(MetadataType::EngineHorsepower).is_some());
        assert_eq!(ctx.diagnostics()[0].kind, DiagnosticKind::FieldParse);
    }

    #[test]
    fn test_engine_absent_yields_nothing() {
        let doc = json!({"model": [{"transmission": {"title": "8-Speed Automatic"}}]});
        let (engines, ctx) = parse_with(&EngineParser, &doc);
        assert!(engines.is_empty());
        assert!(ctx.diagnostics().iter().any(|d| d.kind == DiagnosticKind::NoAttributes));
    }

    #[test]
    fn test_body_style_title_from_cab_and_bed() {
        let doc = json!({"model": [
            {"cab": {"title": "CrewMax"}, "bed": {"title": "5.5 ft. Bed"},
             "attributes": {"msrp": {"value": "$48,000"}, "seating": {"value": "5"}}},
            {"cab": {"title": "CrewMax"}, "bed": {"title": "5.5 ft. Bed"},
             "attributes": {"msrp": {"value": "$45,500"}}},
            {"attributes": {"seating": {"value": "5"}}}
        ]});
        let (styles, _) = parse_with(&BodyStyleParser, &doc);

        assert_eq!(styles.len(), 2);
        assert_eq!(styles[0].title(), "CrewMax 5.5 ft. Bed");
        assert_eq!(
            styles[0].metadata_value(MetadataType::CommonBaseMsrp),
            Some(&MetadataValue::Integer(45_500))
        );
        assert_eq!(styles[1].title(), "Standard");
        assert_eq!(
            styles[1].metadata_value(MetadataType::BodyStyleSeating),
            Some(&MetadataValue::Integer(5))
        );
    }

    #[test]
    fn test_transform_survives_missing_engine() {
        let doc = json!({"model": [{
            "title": "Camry",
            "transmission": {"title": "8-Speed Automatic"},
            "drive": {"title": "FWD"},
            "grade": {"attributes": {"title": {"value": "LE"}}}
        }]});
        let output = toyota_transformer().transform(&doc).unwrap();

        assert_eq!(output.records_in(AttributeCategory::Engine).count(), 0);
        assert!(output.find(AttributeCategory::Transmission, "8-Speed Automatic").is_some());
        assert!(output.find(AttributeCategory::Drive, "FWD").is_some());
        assert!(output.find(AttributeCategory::Grade, "LE").is_some());
    }

    #[test]
    fn test_transform_dedupes_accessory_and_package() {
        let doc = json!({"model": [{
            "title": "RAV4",
            "packages": [{"title": "Weather Package", "price": "$500"}],
            "accessories": [
                {"title": "Weather Package"},
                {"title": "All-Weather Floor Liners", "price": "$169"}
            ]
        }]});
        let output = toyota_transformer().transform(&doc).unwrap();

        let weather: Vec<&AttributeRecord> = output
            .records
            .iter()
            .filter(|r| r.title() == "Weather Package")
            .collect();
        assert_eq!(weather.len(), 1);
        assert_eq!(weather[0].category(), AttributeCategory::Package);
        assert!(output.find(AttributeCategory::Accessory, "All-Weather Floor Liners").is_some());
    }

    #[test]
    fn test_transform_recovers_from_wrong_shapes() {
        let doc = json!({"model": [{"title": "Tacoma", "accessories": "none", "drive": {"title": "4WD"}}]});
        let output = toyota_transformer().transform(&doc).unwrap();

        assert_eq!(output.count(DiagnosticKind::UnexpectedSchema), 1);
        assert!(output.find(AttributeCategory::Drive, "4WD").is_some());
    }

    #[test]
    fn test_model_identifier() {
        assert_eq!(model_identifier(&json!({"model": [{"title": ""}, {"title": "Camry"}]})), "Camry");
        assert!(model_identifier(&json!({"model": []})).starts_with("Unknown - "));
    }
}
