use serde::Serialize;
use serde_json::Value;

use crate::records::{is_unknown, VehicleRecord};

/// Enrichment fields a full-spec card displays; every one must be known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredField {
    Drivetrain,
    Displacement,
    CityEfficiency,
    HighwayEfficiency,
    FuelType,
    Cylinders,
    VehicleClass,
}

impl RequiredField {
    pub const ALL: [RequiredField; 7] = [
        RequiredField::Drivetrain,
        RequiredField::Displacement,
        RequiredField::CityEfficiency,
        RequiredField::HighwayEfficiency,
        RequiredField::FuelType,
        RequiredField::Cylinders,
        RequiredField::VehicleClass,
    ];

    /// Enrichment keys accepted for this field, preferred key first.
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            Self::Drivetrain => &["drive", "drivetrain"],
            Self::Displacement => &["displacement"],
            Self::CityEfficiency => &["city_mpg"],
            Self::HighwayEfficiency => &["highway_mpg"],
            Self::FuelType => &["fuel_type"],
            Self::Cylinders => &["cylinders"],
            Self::VehicleClass => &["class", "vehicle_class"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Drivetrain => "drivetrain",
            Self::Displacement => "displacement",
            Self::CityEfficiency => "city efficiency",
            Self::HighwayEfficiency => "highway efficiency",
            Self::FuelType => "fuel type",
            Self::Cylinders => "cylinder count",
            Self::VehicleClass => "vehicle class",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::CityEfficiency | Self::HighwayEfficiency)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Powertrain {
    Combustion {
        displacement: String,
        cylinders: String,
    },
    Electric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecSheet {
    pub drivetrain: String,
    pub fuel_type: String,
    pub vehicle_class: String,
    pub city_mpg: f64,
    pub highway_mpg: f64,
    pub average_mpg: f64,
    pub powertrain: Powertrain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "variant", content = "specs", rename_all = "snake_case")]
pub enum RenderVariant {
    Minimal,
    FullSpec(SpecSheet),
}

impl RenderVariant {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::FullSpec(_) => "full_spec",
        }
    }

    pub fn spec_sheet(&self) -> Option<&SpecSheet> {
        match self {
            Self::Minimal => None,
            Self::FullSpec(sheet) => Some(sheet),
        }
    }
}

pub fn classify(record: &VehicleRecord) -> RenderVariant {
    match spec_sheet(record) {
        Some(sheet) => RenderVariant::FullSpec(sheet),
        None => RenderVariant::Minimal,
    }
}

/// Fields keeping the record out of the full-spec variant.
pub fn missing_fields(record: &VehicleRecord) -> Vec<RequiredField> {
    RequiredField::ALL
        .into_iter()
        .filter(|field| {
            if field.is_numeric() {
                numeric_field(record, *field).is_none()
            } else {
                text_field(record, *field).is_none()
            }
        })
        .collect()
}

pub fn is_electric(fuel_type: &str) -> bool {
    fuel_type.to_ascii_lowercase().contains("electric")
}

fn spec_sheet(record: &VehicleRecord) -> Option<SpecSheet> {
    let drivetrain = text_field(record, RequiredField::Drivetrain)?;
    let displacement = text_field(record, RequiredField::Displacement)?;
    let city_mpg = numeric_field(record, RequiredField::CityEfficiency)?;
    let highway_mpg = numeric_field(record, RequiredField::HighwayEfficiency)?;
    let fuel_type = text_field(record, RequiredField::FuelType)?;
    let cylinders = text_field(record, RequiredField::Cylinders)?;
    let vehicle_class = text_field(record, RequiredField::VehicleClass)?;

    let powertrain = if is_electric(&fuel_type) {
        Powertrain::Electric
    } else {
        Powertrain::Combustion {
            displacement,
            cylinders,
        }
    };
    Some(SpecSheet {
        drivetrain,
        fuel_type,
        vehicle_class,
        city_mpg,
        highway_mpg,
        average_mpg: (city_mpg + highway_mpg) / 2.0,
        powertrain,
    })
}

fn field_value(record: &VehicleRecord, field: RequiredField) -> Option<&Value> {
    field
        .keys()
        .iter()
        .find_map(|key| record.enrichment_value(key).filter(|value| !value.is_null()))
}

fn text_field(record: &VehicleRecord, field: RequiredField) -> Option<String> {
    let text = match field_value(record, field)? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!is_unknown(&text)).then_some(text)
}

fn numeric_field(record: &VehicleRecord, field: RequiredField) -> Option<f64> {
    let number = match field_value(record, field)? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
