//! Linear distance units and conversions.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Length of one degree of arc on the WGS84 equator, in meters.
pub const METERS_PER_DEGREE: f64 = 111_319.490_793_273_57;

/// Linear units a distance parameter can be expressed in.
///
/// [`DistanceUnit::Default`] means "whatever the CRS uses": no conversion is
/// applied and buffering happens directly in CRS units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistanceUnit {
    /// Native unit of the coordinate reference system.
    #[default]
    Default,
    /// Meter.
    Meter,
    /// Kilometer.
    Kilometer,
    /// Millimeter.
    Millimeter,
    /// Centimeter.
    Centimeter,
    /// Decimeter.
    Decimeter,
    /// International inch.
    Inch,
    /// International foot.
    Foot,
    /// US survey foot.
    UsSurveyFoot,
    /// International yard.
    Yard,
    /// Statute mile.
    Mile,
    /// Nautical mile.
    NauticalMile,
    /// Degree of arc on the equator.
    Degree,
}

impl DistanceUnit {
    /// Size of one unit in meters; `None` for [`DistanceUnit::Default`].
    #[must_use]
    pub fn meters(self) -> Option<f64> {
        let factor = match self {
            Self::Default => return None,
            Self::Meter => 1.0,
            Self::Kilometer => 1_000.0,
            Self::Millimeter => 0.001,
            Self::Centimeter => 0.01,
            Self::Decimeter => 0.1,
            Self::Inch => 0.0254,
            Self::Foot => 0.3048,
            Self::UsSurveyFoot => 1_200.0 / 3_937.0,
            Self::Yard => 0.9144,
            Self::Mile => 1_609.344,
            Self::NauticalMile => 1_852.0,
            Self::Degree => METERS_PER_DEGREE,
        };
        Some(factor)
    }

    /// Short symbol used in logs and the CLI.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Meter => "m",
            Self::Kilometer => "km",
            Self::Millimeter => "mm",
            Self::Centimeter => "cm",
            Self::Decimeter => "dm",
            Self::Inch => "in",
            Self::Foot => "ft",
            Self::UsSurveyFoot => "us-ft",
            Self::Yard => "yd",
            Self::Mile => "mi",
            Self::NauticalMile => "nmi",
            Self::Degree => "deg",
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "default" | "" => Self::Default,
            "m" | "meter" | "meters" | "metre" | "metres" => Self::Meter,
            "km" | "kilometer" | "kilometers" => Self::Kilometer,
            "mm" | "millimeter" | "millimeters" => Self::Millimeter,
            "cm" | "centimeter" | "centimeters" => Self::Centimeter,
            "dm" | "decimeter" | "decimeters" => Self::Decimeter,
            "in" | "inch" | "inches" => Self::Inch,
            "ft" | "foot" | "feet" => Self::Foot,
            "us-ft" | "us_survey_foot" | "ussurveyfoot" => Self::UsSurveyFoot,
            "yd" | "yard" | "yards" => Self::Yard,
            "mi" | "mile" | "miles" => Self::Mile,
            "nmi" | "nauticalmile" | "nautical_mile" => Self::NauticalMile,
            "deg" | "degree" | "degrees" => Self::Degree,
            other => {
                return Err(ConfigError::InvalidOption {
                    option: "distance unit".to_string(),
                    message: format!("unknown unit '{other}'"),
                });
            },
        };
        Ok(unit)
    }
}

/// Converts `value` from one unit to another.
///
/// If either side is [`DistanceUnit::Default`] the value is returned as is.
#[must_use]
pub fn convert_distance(value: f64, from: DistanceUnit, to: DistanceUnit) -> f64 {
    match (from.meters(), to.meters()) {
        (Some(from), Some(to)) => value * from / to,
        _ => value,
    }
}
