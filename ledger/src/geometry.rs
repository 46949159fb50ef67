//! Cross-section geometry and mass per unit length
//!
//! Converts a shape descriptor plus dimensions (millimeters) and a material
//! grade into kilograms per meter. Standardized rolled profiles that cannot be
//! derived from a simple formula carry a precomputed value instead.

use std::collections::HashMap;
use std::f64::consts::PI;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::types::{mm_to_m, DEFAULT_DENSITY_KG_M3, STAINLESS_DENSITY_KG_M3};

/// Cross-section shapes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    RoundBar,
    SquareBar,
    RectangularBar,
    HexBar,
    RoundTube,
    SquareTube,
    RectangularTube,
    /// Rolled section (angle, channel, beam) known only by its profile id
    Profile,
    #[serde(other)]
    Other,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::RoundBar => "round_bar",
            Shape::SquareBar => "square_bar",
            Shape::RectangularBar => "rectangular_bar",
            Shape::HexBar => "hex_bar",
            Shape::RoundTube => "round_tube",
            Shape::SquareTube => "square_tube",
            Shape::RectangularTube => "rectangular_tube",
            Shape::Profile => "profile",
            Shape::Other => "other",
        }
    }
}

/// Unrecognized names parse as `Other`
impl std::str::FromStr for Shape {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "round_bar" => Shape::RoundBar,
            "square_bar" => Shape::SquareBar,
            "rectangular_bar" => Shape::RectangularBar,
            "hex_bar" => Shape::HexBar,
            "round_tube" => Shape::RoundTube,
            "square_tube" => Shape::SquareTube,
            "rectangular_tube" => Shape::RectangularTube,
            "profile" => Shape::Profile,
            _ => Shape::Other,
        })
    }
}

/// Named measurements in millimeters. Only the fields a shape needs are read.
///
/// Square tubes use `side` as the outer size, rectangular tubes use `width`
/// and `height` as outer sizes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub diameter: Option<Decimal>,
    pub side: Option<Decimal>,
    pub width: Option<Decimal>,
    pub height: Option<Decimal>,
    pub outer_diameter: Option<Decimal>,
    pub wall_thickness: Option<Decimal>,
}

/// Reference to a precomputed mass per meter
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileHint {
    /// Value embedded directly on the material
    pub kg_per_meter: Option<Decimal>,
    /// Key into the standardized profile table
    pub profile_id: Option<String>,
}

/// Geometric descriptor of a material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Geometry {
    pub shape: Shape,
    #[serde(default)]
    pub dimensions: Dimensions,
    pub material_grade: Option<String>,
    pub profile: Option<ProfileHint>,
}

/// Read-only lookup of standardized profiles
pub trait ProfileLookup {
    fn kg_per_meter(&self, profile_id: &str) -> Option<Decimal>;
}

impl ProfileLookup for HashMap<String, Decimal> {
    fn kg_per_meter(&self, profile_id: &str) -> Option<Decimal> {
        self.get(profile_id).copied()
    }
}

/// Lookup with no standardized profiles
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProfiles;

impl ProfileLookup for NoProfiles {
    fn kg_per_meter(&self, _profile_id: &str) -> Option<Decimal> {
        None
    }
}

/// Mass per meter of a material. `Unknown` is distinct from a zero weight
/// for display, but valuation treats both as "cannot price by weight".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "kg_per_meter", rename_all = "snake_case")]
pub enum MassPerMeter {
    Known(Decimal),
    Unknown,
}

impl MassPerMeter {
    pub fn kg_per_meter(&self) -> Option<Decimal> {
        match self {
            MassPerMeter::Known(kg) => Some(*kg),
            MassPerMeter::Unknown => None,
        }
    }

    /// Weight in kilograms of the given length
    pub fn weight_kg(&self, length_mm: Decimal) -> Option<Decimal> {
        self.kg_per_meter()
            .and_then(|kg| mm_to_m(length_mm).checked_mul(kg))
    }

    /// The value, or `UnknownGeometry` for callers that cannot degrade
    pub fn require(&self) -> LedgerResult<Decimal> {
        self.kg_per_meter().ok_or(LedgerError::UnknownGeometry)
    }
}

/// Densities in kg/m³ by material grade. Matched case-insensitively.
const GRADE_DENSITIES: &[(&str, f64)] = &[
    // Stainless
    ("1.4301", STAINLESS_DENSITY_KG_M3),
    ("1.4305", STAINLESS_DENSITY_KG_M3),
    ("1.4404", 8000.0),
    ("1.4571", 8000.0),
    // Aluminium
    ("EN AW-6060", 2700.0),
    ("EN AW-6082", 2700.0),
    ("EN AW-7075", 2810.0),
    ("AlMgSi0.5", 2700.0),
    ("AlMgSi1", 2700.0),
    ("AlMg3", 2660.0),
    // Copper alloys
    ("CuZn39Pb3", 8470.0),
    ("CuZn37", 8440.0),
    ("Cu-ETP", 8940.0),
    ("CuSn8", 8800.0),
    // Plastics
    ("POM", 1410.0),
    ("PA6", 1140.0),
    ("PTFE", 2200.0),
];

/// Density for a material grade, falling back to carbon steel
pub fn density_for_grade(grade: Option<&str>) -> f64 {
    let Some(grade) = grade.map(str::trim).filter(|g| !g.is_empty()) else {
        return DEFAULT_DENSITY_KG_M3;
    };

    GRADE_DENSITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(grade))
        .map(|(_, density)| *density)
        .unwrap_or(DEFAULT_DENSITY_KG_M3)
}

/// Positive dimension converted to meters
fn meters(value: Option<Decimal>) -> Option<f64> {
    let mm = value?.to_f64()?;
    (mm > 0.0).then(|| mm / 1000.0)
}

impl Shape {
    /// Cross-sectional area in square meters, or `None` if the shape is not
    /// formula-based or a required dimension is missing or impossible.
    pub fn cross_section_m2(&self, dims: &Dimensions) -> Option<f64> {
        match self {
            Shape::RoundBar => {
                let r = meters(dims.diameter)? / 2.0;
                Some(PI * r * r)
            }
            Shape::SquareBar => {
                let side = meters(dims.side)?;
                Some(side * side)
            }
            Shape::RectangularBar => Some(meters(dims.width)? * meters(dims.height)?),
            Shape::HexBar => {
                let r = meters(dims.diameter)? / 2.0;
                Some(3.0 * 3f64.sqrt() / 2.0 * r * r)
            }
            Shape::RoundTube => {
                let outer = meters(dims.outer_diameter)? / 2.0;
                let inner = outer - meters(dims.wall_thickness)?;
                (inner > 0.0).then(|| PI * (outer * outer - inner * inner))
            }
            Shape::SquareTube => {
                let outer = meters(dims.side)?;
                let inner = outer - 2.0 * meters(dims.wall_thickness)?;
                (inner > 0.0).then(|| outer * outer - inner * inner)
            }
            Shape::RectangularTube => {
                let wall = meters(dims.wall_thickness)?;
                let (outer_w, outer_h) = (meters(dims.width)?, meters(dims.height)?);
                let (inner_w, inner_h) = (outer_w - 2.0 * wall, outer_h - 2.0 * wall);
                (inner_w > 0.0 && inner_h > 0.0).then(|| outer_w * outer_h - inner_w * inner_h)
            }
            Shape::Profile | Shape::Other => None,
        }
    }
}

/// Mass per meter for a material's geometry.
///
/// A profile hint wins over any formula: first an embedded kg/m value, then
/// the standardized profile table. Otherwise area times grade density.
pub fn compute_mass_per_meter(geometry: &Geometry, profiles: &impl ProfileLookup) -> MassPerMeter {
    if let Some(hint) = &geometry.profile {
        if let Some(kg) = hint.kg_per_meter.filter(|kg| !kg.is_sign_negative()) {
            return MassPerMeter::Known(kg);
        }
        if let Some(kg) = hint
            .profile_id
            .as_deref()
            .and_then(|id| profiles.kg_per_meter(id))
            .filter(|kg| !kg.is_sign_negative())
        {
            return MassPerMeter::Known(kg);
        }
    }

    let Some(area) = geometry.shape.cross_section_m2(&geometry.dimensions) else {
        return MassPerMeter::Unknown;
    };

    let density = density_for_grade(geometry.material_grade.as_deref());
    Decimal::from_f64(area * density)
        .map(|kg| MassPerMeter::Known(kg.round_dp(6)))
        .unwrap_or(MassPerMeter::Unknown)
}
