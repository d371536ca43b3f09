//! Per-table extraction guidance given to the model.

use extraction::metadata::normalize_table_number;
use hashbrown::HashMap;

const GENERIC: &str = "\
**Table-Specific Instructions**:
- Extract all data rows from the table
- Follow the schema field definitions
- Preserve units as specified in the schema
- Ignore header rows, footnotes, and captions";

const ENVELOPE_OPAQUE: &str = r#"**Table-Specific Instructions**:
- Extract ONLY rows for "Walls", "Roofs", and "Floors" (case-insensitive)
- Normalize column headers: "Zone 4:(2)" → "zone_4_max_u", "Zone 5:(2)" → "zone_5_max_u", etc.
- U-values must be in W/(m²·K), range 0.05-2.0
- Each zone column contains a single U-value (float)
- Expected output: 3 assemblies (Walls, Roofs, Floors) with 6 U-values each

**Example Output**:
```json
{
  "vintage": "2020",
  "table_number": "3.2.2.2",
  "assemblies": [
    {
      "assembly_type": "Walls",
      "zone_4_max_u": 0.315,
      "zone_5_max_u": 0.278,
      "zone_6_max_u": 0.247,
      "zone_7a_max_u": 0.210,
      "zone_7b_max_u": 0.210,
      "zone_8_max_u": 0.183
    },
    {
      "assembly_type": "Roofs",
      "zone_4_max_u": 0.193,
      "zone_5_max_u": 0.156,
      "zone_6_max_u": 0.156,
      "zone_7a_max_u": 0.138,
      "zone_7b_max_u": 0.138,
      "zone_8_max_u": 0.121
    },
    {
      "assembly_type": "Floors",
      "zone_4_max_u": 0.227,
      "zone_5_max_u": 0.183,
      "zone_6_max_u": 0.183,
      "zone_7a_max_u": 0.162,
      "zone_7b_max_u": 0.162,
      "zone_8_max_u": 0.142
    }
  ]
}
```"#;

const ENVELOPE_FENESTRATION: &str = r#"**Table-Specific Instructions**:
- Extract ONLY rows for fenestration assemblies: "Windows", "Doors", "Skylights"
- Normalize column headers: "Zone 4:(2)" → "zone_4_max_u", etc.
- U-values must be in W/(m²·K), range 0.05-2.0
- Expected output: 2-3 assemblies with 6 U-values each"#;

const FDWR: &str = r#"**Table-Specific Instructions**:
- Extract HDD ranges and corresponding FDWR values
- HDD ranges: "< 3000", "3000 to 3999", "4000 to 4999", etc.
- FDWR values are ratios (0.0-1.0)
- Convert HDD ranges to hdd_min/hdd_max integers
- Use hdd_max=null for open-ended ranges (e.g., "≥ 7000")"#;

const LIGHTING: &str = "\
**Table-Specific Instructions**:
- Extract building/space types and maximum LPD values
- LPD values in W/m²
- Handle hierarchical structure: building type → space type
- Some rows have building_type only, others have both building_type and space_type";

const PIPING: &str = "\
**Table-Specific Instructions**:
- Extract piping insulation requirements
- System types: heating, cooling
- Temperature ranges in °C
- Pipe diameters in mm (may be ranges like \"≤ 25\" or \"40 to 65\")
- Insulation thickness in mm";

const HVAC_A: &str = "\
**Table-Specific Instructions**:
- Extract HVAC equipment performance requirements
- Equipment types, capacity ranges, performance metrics (COP, EER, etc.)
- Capacity may be in kW, tons, or other units
- Handle continuation rows (empty cells indicate continuation of previous row)";

const HVAC_B: &str = "\
**Table-Specific Instructions**:
- Extract HVAC equipment performance requirements
- Similar to 8.4.4.8.A but different equipment categories
- Handle merged cells and continuation rows
- Capacity ranges may span multiple rows";

fn builtin(table_number: &str) -> Option<&'static str> {
    Some(match table_number {
        "3.2.2.2" => ENVELOPE_OPAQUE,
        "3.2.2.3" => ENVELOPE_FENESTRATION,
        "3.2.1.4" => FDWR,
        "4.2.1.3" => LIGHTING,
        "5.2.5.3" => PIPING,
        "8.4.4.8.A" => HVAC_A,
        "8.4.4.8.B" => HVAC_B,
        _ => return None,
    })
}

/// Instructions for each table number: configured overrides first, then the built-in entries,
/// then generic instructions for anything else.
#[derive(Clone, Debug, Default)]
pub struct InstructionTable {
    overrides: HashMap<String, String>,
}

impl InstructionTable {
    /// `overrides` maps table numbers, in any form [SchemaRegistry](crate::schema::SchemaRegistry)
    /// accepts, to instruction text.
    pub fn new(overrides: &HashMap<String, String>) -> Self {
        Self {
            overrides: overrides
                .iter()
                .map(|(number, text)| (normalize_table_number(number), text.clone()))
                .collect(),
        }
    }

    pub fn instructions_for(&self, table_number: &str) -> &str {
        let normalized = normalize_table_number(table_number);
        self.overrides
            .get(&normalized)
            .map(String::as_str)
            .or_else(|| builtin(&normalized))
            .unwrap_or(GENERIC)
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use map_macro::hashbrown::hash_map;

    use super::*;

    #[gtest]
    fn builtin_entries_by_any_number_form() {
        let table = InstructionTable::default();

        expect_that!(
            table.instructions_for("Table 3.2.2.2."),
            contains_substring(r#"Extract ONLY rows for "Walls", "Roofs", and "Floors""#)
        );
        expect_that!(
            table.instructions_for("A-3.2.1.4"),
            contains_substring("hdd_min/hdd_max")
        );
        expect_that!(
            table.instructions_for("8.4.4.8.B"),
            contains_substring("Similar to 8.4.4.8.A")
        );
    }

    #[gtest]
    fn unknown_tables_get_generic_instructions() {
        let table = InstructionTable::default();

        expect_that!(table.instructions_for("Table-4-0"), eq(GENERIC));
        expect_that!(table.instructions_for("9.9.9.9"), eq(GENERIC));
    }

    #[gtest]
    fn overrides_take_precedence() {
        let table = InstructionTable::new(&hash_map! {
            "Table 3.2.2.2.".to_owned() => "Custom walls guidance".to_owned(),
            "6.2.2.1".to_owned() => "Service water heating guidance".to_owned(),
        });

        expect_that!(table.instructions_for("3.2.2.2"), eq("Custom walls guidance"));
        expect_that!(
            table.instructions_for("Table 6.2.2.1."),
            eq("Service water heating guidance")
        );
        expect_that!(table.instructions_for("3.2.2.3"), eq(ENVELOPE_FENESTRATION));
    }
}
