//! Machine-readable shapes of each family, shown to the model in the repair prompt.

use serde_json::{Map, Value, json};

use super::{TableFamily, VINTAGE_PATTERN};

pub(super) fn shape_for(family: TableFamily) -> Value {
    use TableFamily::*;
    match family {
        Envelope => table(
            family,
            "Overall thermal transmittance of building assemblies.",
            json!({"type": "string", "pattern": r"^(3\.2\.2\.[23])$"}),
            "assemblies",
            item(
                "AssemblyRequirement",
                &[
                    (
                        "assembly_type",
                        json!({
                            "type": "string",
                            "enum": ["Walls", "Roofs", "Floors", "Windows", "Doors", "Skylights"],
                        }),
                    ),
                    ("zone_4_max_u", u_value("Zone 4")),
                    ("zone_5_max_u", u_value("Zone 5")),
                    ("zone_6_max_u", u_value("Zone 6")),
                    ("zone_7a_max_u", u_value("Zone 7A")),
                    ("zone_7b_max_u", u_value("Zone 7B")),
                    ("zone_8_max_u", u_value("Zone 8")),
                ],
                &[],
            ),
            3,
            Some(6),
        ),
        Fdwr => table(
            family,
            "Maximum allowable fenestration and door to wall ratio.",
            json!({"type": "string", "default": "3.2.1.4"}),
            "requirements",
            item(
                "FDWRRequirement",
                &[
                    ("hdd_min", int_field(0, 10000, "Minimum HDD")),
                    (
                        "hdd_max",
                        nullable(int_field(0, 10000, "Maximum HDD (null for open-ended)")),
                    ),
                    ("max_fdwr", number_field(Some(0.0), Some(1.0), "Maximum FDWR ratio (0-1)")),
                ],
                &["hdd_max"],
            ),
            1,
            None,
        ),
        Hvac => table(
            family,
            "HVAC equipment performance requirements.",
            json!({"type": "string", "pattern": r"^8\.4\.4\.8\.[AB]$"}),
            "equipment",
            item(
                "HVACEquipmentPerformance",
                &[
                    ("equipment_type", string_field("Type of HVAC equipment")),
                    (
                        "capacity_min",
                        nullable(number_field(None, None, "Minimum capacity (kW or other unit)")),
                    ),
                    (
                        "capacity_max",
                        nullable(number_field(None, None, "Maximum capacity (kW or other unit)")),
                    ),
                    (
                        "performance_metric",
                        string_field("Performance metric (COP, EER, IEER, etc.)"),
                    ),
                    (
                        "minimum_value",
                        number_field(Some(0.0), None, "Minimum required performance"),
                    ),
                ],
                &["capacity_min", "capacity_max"],
            ),
            1,
            None,
        ),
        Lighting => table(
            family,
            "Lighting power density by building and space type.",
            json!({"type": "string", "default": "4.2.1.3"}),
            "requirements",
            item(
                "LightingPowerDensity",
                &[
                    ("building_type", string_field("Building or space type")),
                    (
                        "space_type",
                        nullable(string_field("Specific space type within building")),
                    ),
                    ("max_lpd", number_field(Some(0.0), Some(50.0), "Maximum LPD (W/m²)")),
                ],
                &["space_type"],
            ),
            1,
            None,
        ),
        PipingInsulation => table(
            family,
            "Minimum thickness of piping insulation.",
            json!({"type": "string", "default": "5.2.5.3"}),
            "requirements",
            item(
                "PipingInsulation",
                &[
                    ("system_type", string_field("Heating or cooling system")),
                    (
                        "temp_range_min",
                        number_field(None, None, "Min operating temperature (°C)"),
                    ),
                    (
                        "temp_range_max",
                        number_field(None, None, "Max operating temperature (°C)"),
                    ),
                    ("pipe_diameter_mm", string_field("Pipe diameter range (mm)")),
                    (
                        "min_insulation_thickness_mm",
                        number_field(Some(0.0), None, "Minimum insulation thickness (mm)"),
                    ),
                ],
                &[],
            ),
            1,
            None,
        ),
    }
}

fn table(
    family: TableFamily,
    description: &str,
    table_number: Value,
    list_key: &str,
    item: Value,
    min_items: usize,
    max_items: Option<usize>,
) -> Value {
    let mut list = json!({"type": "array", "items": item, "minItems": min_items});
    if let (Some(max_items), Some(list)) = (max_items, list.as_object_mut()) {
        list.insert("maxItems".to_owned(), json!(max_items));
    }

    let mut required = vec!["vintage", list_key];
    if table_number.get("default").is_none() {
        required.insert(1, "table_number");
    }

    let mut properties = Map::new();
    properties.insert(
        "vintage".to_owned(),
        json!({"type": "string", "pattern": VINTAGE_PATTERN}),
    );
    properties.insert("table_number".to_owned(), table_number);
    properties.insert(list_key.to_owned(), list);

    json!({
        "title": family.schema_name(),
        "description": description,
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn item(title: &str, fields: &[(&str, Value)], optional: &[&str]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|(name, shape)| ((*name).to_owned(), shape.clone()))
        .collect();
    let required: Vec<&str> = fields
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| !optional.contains(name))
        .collect();
    json!({
        "title": title,
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn u_value(zone: &str) -> Value {
    number_field(
        Some(0.05),
        Some(2.0),
        &format!("{zone} max U-value (W/m²·K)"),
    )
}

fn number_field(minimum: Option<f64>, maximum: Option<f64>, description: &str) -> Value {
    let mut shape = Map::new();
    shape.insert("type".to_owned(), json!("number"));
    if let Some(minimum) = minimum {
        shape.insert("minimum".to_owned(), json!(minimum));
    }
    if let Some(maximum) = maximum {
        shape.insert("maximum".to_owned(), json!(maximum));
    }
    shape.insert("description".to_owned(), json!(description));
    Value::Object(shape)
}

fn int_field(minimum: u32, maximum: u32, description: &str) -> Value {
    json!({"type": "integer", "minimum": minimum, "maximum": maximum, "description": description})
}

fn string_field(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn nullable(mut shape: Value) -> Value {
    if let Some(kind) = shape.get_mut("type") {
        let single = kind.take();
        *kind = json!([single, "null"]);
    }
    shape
}
