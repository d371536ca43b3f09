//! Target schemas for the supported table families, and strict validation of model output against
//! them.


mod check;
pub mod records;
mod shape;

use extraction::metadata::normalize_table_number;
use lazy_regex::regex_is_match;
use serde_json::Value;

pub use check::FieldError;
use check::{Bounds, Checker, FieldPath, Fields};
pub use records::*;

/// Vintages of the code that are recognised.
pub const VINTAGES: [&str; 4] = ["2011", "2015", "2017", "2020"];

const VINTAGE_PATTERN: &str = "^(2011|2015|2017|2020)$";
const SCHEMA_VERSION: &str = "1";

const U_VALUE: Bounds = Bounds::between(0.05, 2.0);
const HDD: Bounds = Bounds::between(0.0, 10000.0);

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    serde::Serialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TableFamily {
    Envelope,
    Fdwr,
    Hvac,
    Lighting,
    PipingInsulation,
}

impl TableFamily {
    pub fn schema_name(self) -> &'static str {
        use TableFamily::*;
        match self {
            Envelope => "EnvelopeTable",
            Fdwr => "FDWRTable",
            Hvac => "HVACTable",
            Lighting => "LightingTable",
            PipingInsulation => "PipingInsulationTable",
        }
    }
}

/// Table numbers (normalized) with a schema.
const KNOWN_TABLES: [(&str, TableFamily); 7] = [
    ("3.2.2.2", TableFamily::Envelope),
    ("3.2.2.3", TableFamily::Envelope),
    ("3.2.1.4", TableFamily::Fdwr),
    ("4.2.1.3", TableFamily::Lighting),
    ("5.2.5.3", TableFamily::PipingInsulation),
    ("8.4.4.8.A", TableFamily::Hvac),
    ("8.4.4.8.B", TableFamily::Hvac),
];

/// Looks up the [TargetSchema] for a table number.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// Accepts any of `3.2.2.2`, `Table 3.2.2.2`, `Table 3.2.2.2.` or `A-3.2.2.2`.
    pub fn lookup(&self, table_number: &str) -> Option<TargetSchema> {
        let normalized = normalize_table_number(table_number);
        KNOWN_TABLES
            .iter()
            .find(|(number, _)| *number == normalized)
            .map(|(number, family)| TargetSchema::new(*family, number))
    }

    /// Normalized numbers of every table with a schema.
    pub fn known_tables(&self) -> impl Iterator<Item = &'static str> {
        KNOWN_TABLES.iter().map(|(number, _)| *number)
    }
}

/// A named, versioned record definition for one table.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetSchema {
    family: TableFamily,
    table_number: &'static str,
    shape: Value,
}

impl TargetSchema {
    fn new(family: TableFamily, table_number: &'static str) -> Self {
        Self {
            family,
            table_number,
            shape: shape::shape_for(family),
        }
    }

    pub fn family(&self) -> TableFamily {
        self.family
    }

    pub fn name(&self) -> &'static str {
        self.family.schema_name()
    }

    pub fn version(&self) -> &'static str {
        SCHEMA_VERSION
    }

    /// Normalized number of the table this schema was looked up for.
    pub fn table_number(&self) -> &'static str {
        self.table_number
    }

    /// JSON-schema-like description of the expected record.
    pub fn shape(&self) -> &Value {
        &self.shape
    }

    /// Checks `value` field by field without coercing anything, and builds the typed record only
    /// if there were no violations at all. `vintage` is the vintage of the document being
    /// parsed, which the record must repeat.
    pub fn validate(&self, value: &Value, vintage: &str) -> Result<TableRecord, Vec<FieldError>> {
        let mut checker = Checker::default();
        let record = match self.family {
            TableFamily::Envelope => envelope(&mut checker, value, vintage).map(TableRecord::Envelope),
            TableFamily::Fdwr => fdwr(&mut checker, value, vintage).map(TableRecord::Fdwr),
            TableFamily::Hvac => hvac(&mut checker, value, vintage).map(TableRecord::Hvac),
            TableFamily::Lighting => lighting(&mut checker, value, vintage).map(TableRecord::Lighting),
            TableFamily::PipingInsulation => {
                piping(&mut checker, value, vintage).map(TableRecord::PipingInsulation)
            }
        };
        checker.finish(record)
    }
}

fn vintage_field(checker: &mut Checker, fields: &Fields, requested: &str) -> Option<String> {
    let vintage = fields.required_str(checker, "vintage")?;
    let path = fields.path("vintage");
    if !checker.pattern(&path, regex_is_match!("^(2011|2015|2017|2020)$", &vintage), VINTAGE_PATTERN)
    {
        return None;
    }
    if vintage != requested {
        checker.error(
            &path,
            format!("Vintage {vintage} does not match the document vintage {requested}"),
        );
        return None;
    }
    Some(vintage)
}

/// Checks every item, then yields them all only if each one passed.
fn each_item<'v, T>(
    checker: &mut Checker,
    items: Option<Vec<(FieldPath, &'v Value)>>,
    mut check_item: impl FnMut(&mut Checker, &FieldPath, &'v Value) -> Option<T>,
) -> Option<Vec<T>> {
    let checked: Vec<Option<T>> = items?
        .into_iter()
        .map(|(path, item)| check_item(checker, &path, item))
        .collect();
    checked.into_iter().collect()
}

fn envelope(checker: &mut Checker, value: &Value, requested: &str) -> Option<EnvelopeTable> {
    let fields = checker.object(
        &FieldPath::default(),
        value,
        &["vintage", "table_number", "assemblies"],
    )?;

    let vintage = vintage_field(checker, &fields, requested);
    let table_number = fields.required_str(checker, "table_number").filter(|number| {
        checker.pattern(
            &fields.path("table_number"),
            regex_is_match!(r"^(3\.2\.2\.[23])$", number),
            r"^(3\.2\.2\.[23])$",
        )
    });
    let items = fields.list(checker, "assemblies", 3, Some(6));
    let assemblies = each_item(checker, items, assembly);

    if let Some(assemblies) = &assemblies {
        let has_opaque = [AssemblyType::Walls, AssemblyType::Roofs, AssemblyType::Floors]
            .iter()
            .all(|required| assemblies.iter().any(|a| a.assembly_type == *required));
        let has_fenestration = assemblies.iter().any(|a| !a.assembly_type.is_opaque());
        if !(has_opaque || has_fenestration) {
            checker.error(
                &fields.path("assemblies"),
                "Value error, Must have at least Walls/Roofs/Floors or Windows/Doors/Skylights",
            );
        }
    }

    Some(EnvelopeTable {
        vintage: vintage?,
        table_number: table_number?,
        assemblies: assemblies?,
    })
}

fn assembly(checker: &mut Checker, path: &FieldPath, value: &Value) -> Option<AssemblyRequirement> {
    let fields = checker.object(
        path,
        value,
        &[
            "assembly_type",
            "zone_4_max_u",
            "zone_5_max_u",
            "zone_6_max_u",
            "zone_7a_max_u",
            "zone_7b_max_u",
            "zone_8_max_u",
        ],
    )?;

    let assembly_type = fields
        .required_str(checker, "assembly_type")
        .and_then(|name| {
            let parsed = name.parse::<AssemblyType>().ok();
            checker.pattern(
                &fields.path("assembly_type"),
                parsed.is_some(),
                "^(Walls|Roofs|Floors|Windows|Doors|Skylights)$",
            );
            parsed
        });
    let zone_4_max_u = fields.required_f64(checker, "zone_4_max_u", U_VALUE);
    let zone_5_max_u = fields.required_f64(checker, "zone_5_max_u", U_VALUE);
    let zone_6_max_u = fields.required_f64(checker, "zone_6_max_u", U_VALUE);
    let zone_7a_max_u = fields.required_f64(checker, "zone_7a_max_u", U_VALUE);
    let zone_7b_max_u = fields.required_f64(checker, "zone_7b_max_u", U_VALUE);
    let zone_8_max_u = fields.required_f64(checker, "zone_8_max_u", U_VALUE);

    Some(AssemblyRequirement {
        assembly_type: assembly_type?,
        zone_4_max_u: zone_4_max_u?,
        zone_5_max_u: zone_5_max_u?,
        zone_6_max_u: zone_6_max_u?,
        zone_7a_max_u: zone_7a_max_u?,
        zone_7b_max_u: zone_7b_max_u?,
        zone_8_max_u: zone_8_max_u?,
    })
}

fn fdwr(checker: &mut Checker, value: &Value, requested: &str) -> Option<FdwrTable> {
    let fields = checker.object(
        &FieldPath::default(),
        value,
        &["vintage", "table_number", "requirements"],
    )?;

    let vintage = vintage_field(checker, &fields, requested);
    let table_number = fields.str_or(checker, "table_number", "3.2.1.4");
    let items = fields.list(checker, "requirements", 1, None);
    let requirements = each_item(checker, items, |checker, path, item| {
        let fields = checker.object(path, item, &["hdd_min", "hdd_max", "max_fdwr"])?;
        let hdd_min = fields.required_u32(checker, "hdd_min", HDD);
        let hdd_max = fields.optional_u32(checker, "hdd_max", HDD);
        let max_fdwr = fields.required_f64(checker, "max_fdwr", Bounds::between(0.0, 1.0));
        Some(FdwrRequirement {
            hdd_min: hdd_min?,
            hdd_max: hdd_max?,
            max_fdwr: max_fdwr?,
        })
    });

    Some(FdwrTable {
        vintage: vintage?,
        table_number: table_number?,
        requirements: requirements?,
    })
}

fn hvac(checker: &mut Checker, value: &Value, requested: &str) -> Option<HvacTable> {
    let fields = checker.object(
        &FieldPath::default(),
        value,
        &["vintage", "table_number", "equipment"],
    )?;

    let vintage = vintage_field(checker, &fields, requested);
    let table_number = fields.required_str(checker, "table_number").filter(|number| {
        checker.pattern(
            &fields.path("table_number"),
            regex_is_match!(r"^8\.4\.4\.8\.[AB]$", number),
            r"^8\.4\.4\.8\.[AB]$",
        )
    });
    let items = fields.list(checker, "equipment", 1, None);
    let equipment = each_item(checker, items, |checker, path, item| {
        let fields = checker.object(
            path,
            item,
            &[
                "equipment_type",
                "capacity_min",
                "capacity_max",
                "performance_metric",
                "minimum_value",
            ],
        )?;
        let equipment_type = fields.required_str(checker, "equipment_type");
        let capacity_min = fields.optional_f64(checker, "capacity_min", Bounds::NONE);
        let capacity_max = fields.optional_f64(checker, "capacity_max", Bounds::NONE);
        let performance_metric = fields.required_str(checker, "performance_metric");
        let minimum_value = fields.required_f64(checker, "minimum_value", Bounds::at_least(0.0));
        Some(HvacEquipmentPerformance {
            equipment_type: equipment_type?,
            capacity_min: capacity_min?,
            capacity_max: capacity_max?,
            performance_metric: performance_metric?,
            minimum_value: minimum_value?,
        })
    });

    Some(HvacTable {
        vintage: vintage?,
        table_number: table_number?,
        equipment: equipment?,
    })
}

fn lighting(checker: &mut Checker, value: &Value, requested: &str) -> Option<LightingTable> {
    let fields = checker.object(
        &FieldPath::default(),
        value,
        &["vintage", "table_number", "requirements"],
    )?;

    let vintage = vintage_field(checker, &fields, requested);
    let table_number = fields.str_or(checker, "table_number", "4.2.1.3");
    let items = fields.list(checker, "requirements", 1, None);
    let requirements = each_item(checker, items, |checker, path, item| {
        let fields = checker.object(path, item, &["building_type", "space_type", "max_lpd"])?;
        let building_type = fields.required_str(checker, "building_type");
        let space_type = fields.optional_str(checker, "space_type");
        let max_lpd = fields.required_f64(checker, "max_lpd", Bounds::between(0.0, 50.0));
        Some(LightingPowerDensity {
            building_type: building_type?,
            space_type: space_type?,
            max_lpd: max_lpd?,
        })
    });

    Some(LightingTable {
        vintage: vintage?,
        table_number: table_number?,
        requirements: requirements?,
    })
}

fn piping(checker: &mut Checker, value: &Value, requested: &str) -> Option<PipingInsulationTable> {
    let fields = checker.object(
        &FieldPath::default(),
        value,
        &["vintage", "table_number", "requirements"],
    )?;

    let vintage = vintage_field(checker, &fields, requested);
    let table_number = fields.str_or(checker, "table_number", "5.2.5.3");
    let items = fields.list(checker, "requirements", 1, None);
    let requirements = each_item(checker, items, |checker, path, item| {
        let fields = checker.object(
            path,
            item,
            &[
                "system_type",
                "temp_range_min",
                "temp_range_max",
                "pipe_diameter_mm",
                "min_insulation_thickness_mm",
            ],
        )?;
        let system_type = fields.required_str(checker, "system_type");
        let temp_range_min = fields.required_f64(checker, "temp_range_min", Bounds::NONE);
        let temp_range_max = fields.required_f64(checker, "temp_range_max", Bounds::NONE);
        let pipe_diameter_mm = fields.required_str(checker, "pipe_diameter_mm");
        let min_insulation_thickness_mm =
            fields.required_f64(checker, "min_insulation_thickness_mm", Bounds::at_least(0.0));
        Some(PipingInsulation {
            system_type: system_type?,
            temp_range_min: temp_range_min?,
            temp_range_max: temp_range_max?,
            pipe_diameter_mm: pipe_diameter_mm?,
            min_insulation_thickness_mm: min_insulation_thickness_mm?,
        })
    });

    Some(PipingInsulationTable {
        vintage: vintage?,
        table_number: table_number?,
        requirements: requirements?,
    })
}
