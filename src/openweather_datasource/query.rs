// openweather_datasource - Dashboard data source for the OpenWeather forecast API
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::ForecastEntry;
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum QueryError {
    Malformed(serde_json::Error),
    InvalidUnits(String),
    InvalidParameter(String, String),
}

impl QueryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_query",
            Self::InvalidUnits(_) => "invalid_units",
            Self::InvalidParameter(_, _) => "invalid_parameter",
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "json unmarshal: {}", e),
            Self::InvalidUnits(u) => write!(f, "invalid units {}, expected standard, metric, or imperial", u),
            Self::InvalidParameter(main, sub) if sub.is_empty() => write!(f, "unsupported parameter {}", main),
            Self::InvalidParameter(main, sub) => write!(f, "unsupported parameter {} - {}", main, sub),
        }
    }
}

impl error::Error for QueryError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

/// Query built by the query editor, one per panel target. The ref ID is read from
/// the raw query, see `DataQuery::ref_id`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryModel {
    pub city: String,
    pub main_parameter: String,
    pub sub_parameter: String,
    pub units: String,
    pub with_description: bool,
}

impl QueryModel {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, QueryError> {
        QueryModel::deserialize(value).map_err(QueryError::Malformed)
    }
}

/// Unit systems supported by the OpenWeather API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    Standard,
    #[default]
    Metric,
    Imperial,
}

impl Units {
    /// Parse units from a query, an empty value means metric.
    pub fn parse(s: &str) -> Result<Self, QueryError> {
        match s.trim().to_lowercase().as_str() {
            "" | "metric" => Ok(Self::Metric),
            "standard" => Ok(Self::Standard),
            "imperial" => Ok(Self::Imperial),
            _ => Err(QueryError::InvalidUnits(s.to_owned())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single numeric field of a forecast entry, selected by a `(main, sub)` parameter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Temp,
    FeelsLike,
    TempMin,
    TempMax,
    Pressure,
    SeaLevel,
    GroundLevel,
    Humidity,
    WindSpeed,
    WindDeg,
    WindGust,
    Clouds,
    Rain,
    Snow,
}

impl Parameter {
    /// Resolve the main and sub parameter from a query.
    ///
    /// `clouds`, `rain`, and `snow` have a single value each so their sub parameter
    /// may be left empty.
    pub fn parse(main: &str, sub: &str) -> Result<Self, QueryError> {
        let param = match (main, sub) {
            ("main", "temp") => Self::Temp,
            ("main", "feels_like") => Self::FeelsLike,
            ("main", "temp_min") => Self::TempMin,
            ("main", "temp_max") => Self::TempMax,
            ("main", "pressure") => Self::Pressure,
            ("main", "sea_level") => Self::SeaLevel,
            ("main", "grnd_level") => Self::GroundLevel,
            ("main", "humidity") => Self::Humidity,
            ("wind", "speed") => Self::WindSpeed,
            ("wind", "deg") => Self::WindDeg,
            ("wind", "gust") => Self::WindGust,
            ("clouds", "" | "all") => Self::Clouds,
            ("rain", "" | "3h") => Self::Rain,
            ("snow", "" | "3h") => Self::Snow,
            _ => return Err(QueryError::InvalidParameter(main.to_owned(), sub.to_owned())),
        };

        Ok(param)
    }

    pub fn main(&self) -> &'static str {
        match self {
            Self::Temp
            | Self::FeelsLike
            | Self::TempMin
            | Self::TempMax
            | Self::Pressure
            | Self::SeaLevel
            | Self::GroundLevel
            | Self::Humidity => "main",
            Self::WindSpeed | Self::WindDeg | Self::WindGust => "wind",
            Self::Clouds => "clouds",
            Self::Rain => "rain",
            Self::Snow => "snow",
        }
    }

    pub fn sub(&self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::FeelsLike => "feels_like",
            Self::TempMin => "temp_min",
            Self::TempMax => "temp_max",
            Self::Pressure => "pressure",
            Self::SeaLevel => "sea_level",
            Self::GroundLevel => "grnd_level",
            Self::Humidity => "humidity",
            Self::WindSpeed => "speed",
            Self::WindDeg => "deg",
            Self::WindGust => "gust",
            Self::Clouds => "all",
            Self::Rain | Self::Snow => "3h",
        }
    }

    /// Name shown for the value field of a frame, e.g. "main - temp".
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.main(), self.sub())
    }

    /// Read the value of this parameter from a forecast entry. Absent optional
    /// blocks (gust, rain, snow) read as zero.
    pub fn select(&self, entry: &ForecastEntry) -> f64 {
        match self {
            Self::Temp => entry.main.temp,
            Self::FeelsLike => entry.main.feels_like,
            Self::TempMin => entry.main.temp_min,
            Self::TempMax => entry.main.temp_max,
            Self::Pressure => entry.main.pressure,
            Self::SeaLevel => entry.main.sea_level,
            Self::GroundLevel => entry.main.grnd_level,
            Self::Humidity => entry.main.humidity,
            Self::WindSpeed => entry.wind.speed,
            Self::WindDeg => entry.wind.deg,
            Self::WindGust => entry.wind.gust.unwrap_or(0.0),
            Self::Clouds => entry.clouds.all,
            Self::Rain => entry.rain.as_ref().map(|r| r.three_hour).unwrap_or(0.0),
            Self::Snow => entry.snow.as_ref().map(|s| s.three_hour).unwrap_or(0.0),
        }
    }

    /// Dashboard unit ID for this parameter when fetched in the given unit system.
    pub fn unit(&self, units: Units) -> &'static str {
        match self {
            Self::Temp | Self::FeelsLike | Self::TempMin | Self::TempMax => match units {
                Units::Standard => "kelvin",
                Units::Metric => "celsius",
                Units::Imperial => "fahrenheit",
            },
            Self::WindSpeed | Self::WindGust => match units {
                Units::Imperial => "velocitymph",
                _ => "velocityms",
            },
            Self::Pressure | Self::SeaLevel | Self::GroundLevel => "pressurehpa",
            Self::Humidity => "humidity",
            Self::WindDeg => "degree",
            Self::Clouds => "percent",
            Self::Rain | Self::Snow => "lengthmm",
        }
    }
}
