//! Typed records for each table family. Values of these types only come out of
//! [super::TargetSchema::validate].

use serde::Serialize;

#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumIter,
    strum_macros::EnumString,
)]
pub enum AssemblyType {
    Walls,
    Roofs,
    Floors,
    Windows,
    Doors,
    Skylights,
}

impl AssemblyType {
    pub fn is_opaque(self) -> bool {
        matches!(self, Self::Walls | Self::Roofs | Self::Floors)
    }
}

/// Maximum U-values in W/(m²·K) for one assembly, per climate zone.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssemblyRequirement {
    pub assembly_type: AssemblyType,
    pub zone_4_max_u: f64,
    pub zone_5_max_u: f64,
    pub zone_6_max_u: f64,
    pub zone_7a_max_u: f64,
    pub zone_7b_max_u: f64,
    pub zone_8_max_u: f64,
}

/// Tables 3.2.2.2 (opaque assemblies) and 3.2.2.3 (fenestration).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnvelopeTable {
    pub vintage: String,
    pub table_number: String,
    pub assemblies: Vec<AssemblyRequirement>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FdwrRequirement {
    pub hdd_min: u32,
    /// `None` for the open-ended top range.
    pub hdd_max: Option<u32>,
    pub max_fdwr: f64,
}

/// Table 3.2.1.4, maximum fenestration and door to wall ratio by heating degree-days.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FdwrTable {
    pub vintage: String,
    pub table_number: String,
    pub requirements: Vec<FdwrRequirement>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HvacEquipmentPerformance {
    pub equipment_type: String,
    pub capacity_min: Option<f64>,
    pub capacity_max: Option<f64>,
    /// COP, EER, IEER and so on.
    pub performance_metric: String,
    pub minimum_value: f64,
}

/// Tables 8.4.4.8.A and 8.4.4.8.B.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HvacTable {
    pub vintage: String,
    pub table_number: String,
    pub equipment: Vec<HvacEquipmentPerformance>,
}

/// Maximum lighting power density in W/m².
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LightingPowerDensity {
    pub building_type: String,
    pub space_type: Option<String>,
    pub max_lpd: f64,
}

/// Table 4.2.1.3.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LightingTable {
    pub vintage: String,
    pub table_number: String,
    pub requirements: Vec<LightingPowerDensity>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipingInsulation {
    pub system_type: String,
    /// °C
    pub temp_range_min: f64,
    /// °C
    pub temp_range_max: f64,
    /// Free text such as `≤ 25` or `40 to 65`.
    pub pipe_diameter_mm: String,
    pub min_insulation_thickness_mm: f64,
}

/// Table 5.2.5.3.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipingInsulationTable {
    pub vintage: String,
    pub table_number: String,
    pub requirements: Vec<PipingInsulation>,
}

/// A validated record of any family.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TableRecord {
    Envelope(EnvelopeTable),
    Fdwr(FdwrTable),
    Hvac(HvacTable),
    Lighting(LightingTable),
    PipingInsulation(PipingInsulationTable),
}

impl TableRecord {
    pub fn vintage(&self) -> &str {
        use TableRecord::*;
        match self {
            Envelope(t) => &t.vintage,
            Fdwr(t) => &t.vintage,
            Hvac(t) => &t.vintage,
            Lighting(t) => &t.vintage,
            PipingInsulation(t) => &t.vintage,
        }
    }

    pub fn table_number(&self) -> &str {
        use TableRecord::*;
        match self {
            Envelope(t) => &t.table_number,
            Fdwr(t) => &t.table_number,
            Hvac(t) => &t.table_number,
            Lighting(t) => &t.table_number,
            PipingInsulation(t) => &t.table_number,
        }
    }

    /// Number of data rows in the record.
    pub fn row_count(&self) -> usize {
        use TableRecord::*;
        match self {
            Envelope(t) => t.assemblies.len(),
            Fdwr(t) => t.requirements.len(),
            Hvac(t) => t.equipment.len(),
            Lighting(t) => t.requirements.len(),
            PipingInsulation(t) => t.requirements.len(),
        }
    }
}
