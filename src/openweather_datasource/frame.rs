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

//! Tabular time-series frames in the JSON shape dashboards expect.
//!
//! A frame is serialized as a schema (frame name, ref ID, and the name, type, and
//! config of each field) followed by the column values:
//!
//! ```text
//! {
//!   "schema": {"name": "response", "refId": "A", "fields": [{"name": "time", "type": "time", ...}]},
//!   "data": {"values": [[1700000000000, ...], [12.5, ...]]}
//! }
//! ```
//!
//! Time values are milliseconds since the UNIX epoch.

use crate::client::Forecast;
use crate::query::{Parameter, Units};
use serde::{Serialize, Serializer};
use std::error;
use std::fmt;

pub const FRAME_NAME: &str = "response";
pub const FIELD_TIME: &str = "time";
pub const FIELD_VALUE: &str = "value";
pub const FIELD_DESCRIPTION: &str = "description";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    LengthMismatch { field: String, expected: usize, actual: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { field, expected, actual } => write!(
                f,
                "field {} has {} values but the frame has {} rows",
                field, actual, expected
            ),
        }
    }
}

impl error::Error for FrameError {}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Values {
    Time(Vec<i64>),
    Number(Vec<f64>),
    String(Vec<String>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Self::Time(v) => v.len(),
            Self::Number(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Time(_) => "time",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    fn frame_type(&self) -> &'static str {
        match self {
            Self::Time(_) => "time.Time",
            Self::Number(_) => "float64",
            Self::String(_) => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub config: FieldConfig,
    pub values: Values,
}

impl Field {
    pub fn time<S: Into<String>>(name: S, millis: Vec<i64>) -> Self {
        Self::new(name, Values::Time(millis))
    }

    pub fn number<S: Into<String>>(name: S, values: Vec<f64>) -> Self {
        Self::new(name, Values::Number(values))
    }

    pub fn string<S: Into<String>>(name: S, values: Vec<String>) -> Self {
        Self::new(name, Values::String(values))
    }

    fn new<S: Into<String>>(name: S, values: Values) -> Self {
        Field {
            name: name.into(),
            config: FieldConfig::default(),
            values,
        }
    }

    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.display_name = Some(name.into());
        self
    }

    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.config.unit = Some(unit.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub name: String,
    pub ref_id: Option<String>,
    pub fields: Vec<Field>,
}

impl Frame {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Frame {
            name: name.into(),
            ref_id: None,
            fields: Vec::new(),
        }
    }

    pub fn with_ref_id<S: Into<String>>(mut self, ref_id: S) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    /// Append a field to the frame. Every field of a frame must have the same number
    /// of values, a field of any other length is rejected.
    pub fn push_field(&mut self, field: Field) -> Result<(), FrameError> {
        if let Some(first) = self.fields.first() {
            if first.values.len() != field.values.len() {
                return Err(FrameError::LengthMismatch {
                    field: field.name,
                    expected: first.values.len(),
                    actual: field.values.len(),
                });
            }
        }

        self.fields.push(field);
        Ok(())
    }

    /// Number of rows in the frame.
    pub fn len(&self) -> usize {
        self.fields.first().map(|f| f.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Serialize)]
struct TypeInfo {
    frame: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldSchema<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    type_: &'static str,
    type_info: TypeInfo,
    config: &'a FieldConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Schema<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_id: Option<&'a str>,
    fields: Vec<FieldSchema<'a>>,
}

#[derive(Serialize)]
struct Data<'a> {
    values: Vec<&'a Values>,
}

#[derive(Serialize)]
struct FrameJson<'a> {
    schema: Schema<'a>,
    data: Data<'a>,
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let schema = Schema {
            name: &self.name,
            ref_id: self.ref_id.as_deref(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldSchema {
                    name: &f.name,
                    type_: f.values.type_name(),
                    type_info: TypeInfo {
                        frame: f.values.frame_type(),
                    },
                    config: &f.config,
                })
                .collect(),
        };

        let data = Data {
            values: self.fields.iter().map(|f| &f.values).collect(),
        };

        FrameJson { schema, data }.serialize(serializer)
    }
}

/// Build a frame with a time column and a value column holding `param` of each forecast
/// entry, in the order returned by the API. A third column with the weather description
/// of each entry is added when `with_description` is set.
///
/// Timestamps too large to be represented in milliseconds are clamped.
pub fn forecast_frame(
    ref_id: &str,
    param: Parameter,
    units: Units,
    forecast: &Forecast,
    with_description: bool,
) -> Result<Frame, FrameError> {
    let mut times = Vec::with_capacity(forecast.list.len());
    let mut values = Vec::with_capacity(forecast.list.len());

    for entry in forecast.list.iter() {
        times.push(entry.dt.saturating_mul(1000));
        values.push(param.select(entry));
    }

    let mut frame = Frame::new(FRAME_NAME).with_ref_id(ref_id);
    frame.push_field(Field::time(FIELD_TIME, times).with_display_name("Time"))?;
    frame.push_field(
        Field::number(FIELD_VALUE, values)
            .with_display_name(param.display_name())
            .with_unit(param.unit(units)),
    )?;

    if with_description {
        let descriptions = forecast.list.iter().map(|e| e.description().to_owned()).collect();
        frame.push_field(Field::string(FIELD_DESCRIPTION, descriptions).with_display_name("Description"))?;
    }

    Ok(frame)
}

#[cfg(test)]
mod test {
    use super::{forecast_frame, Field, Frame, FrameError, Values, FIELD_DESCRIPTION, FIELD_TIME, FIELD_VALUE};
    use crate::client::{Clouds, Conditions, Forecast, ForecastEntry, MainReadings, Wind};
    use crate::query::{Parameter, Units};
    use serde_json::json;

    fn entry(dt: i64, temp: f64, description: &str) -> ForecastEntry {
        ForecastEntry {
            dt,
            main: MainReadings {
                temp,
                humidity: 50.0,
                ..Default::default()
            },
            weather: vec![Conditions {
                id: 800,
                main: "Clear".to_owned(),
                description: description.to_owned(),
            }],
            wind: Wind::default(),
            clouds: Clouds::default(),
            rain: None,
            snow: None,
        }
    }

    fn forecast() -> Forecast {
        Forecast {
            list: vec![
                entry(1700000000, 3.5, "clear sky"),
                entry(1700010800, 2.25, "few clouds"),
            ],
            city: None,
        }
    }

    #[test]
    fn test_forecast_frame_values() {
        let frame = forecast_frame("A", Parameter::Temp, Units::Metric, &forecast(), false).unwrap();

        assert_eq!(Some("A".to_owned()), frame.ref_id);
        assert_eq!(2, frame.fields.len());
        assert_eq!(2, frame.len());
        assert_eq!(
            Values::Time(vec![1700000000000, 1700010800000]),
            frame.field(FIELD_TIME).unwrap().values
        );
        assert_eq!(Values::Number(vec![3.5, 2.25]), frame.field(FIELD_VALUE).unwrap().values);
        assert!(frame.field(FIELD_DESCRIPTION).is_none());
    }

    #[test]
    fn test_forecast_frame_with_description() {
        let frame = forecast_frame("A", Parameter::Humidity, Units::Metric, &forecast(), true).unwrap();

        assert_eq!(3, frame.fields.len());
        assert_eq!(Values::Number(vec![50.0, 50.0]), frame.field(FIELD_VALUE).unwrap().values);
        assert_eq!(
            Values::String(vec!["clear sky".to_owned(), "few clouds".to_owned()]),
            frame.field(FIELD_DESCRIPTION).unwrap().values
        );
    }

    #[test]
    fn test_forecast_frame_empty_list() {
        let frame = forecast_frame("A", Parameter::Temp, Units::Metric, &Forecast::default(), false).unwrap();
        assert!(frame.is_empty());
        assert_eq!(2, frame.fields.len());
    }

    #[test]
    fn test_frame_serialize() {
        let frame = forecast_frame("B", Parameter::Temp, Units::Imperial, &forecast(), false).unwrap();
        let out = serde_json::to_value(&frame).unwrap();

        assert_eq!(
            json!({
                "schema": {
                    "name": "response",
                    "refId": "B",
                    "fields": [
                        {
                            "name": "time",
                            "type": "time",
                            "typeInfo": {"frame": "time.Time"},
                            "config": {"displayName": "Time"},
                        },
                        {
                            "name": "value",
                            "type": "number",
                            "typeInfo": {"frame": "float64"},
                            "config": {"displayName": "main - temp", "unit": "fahrenheit"},
                        },
                    ],
                },
                "data": {
                    "values": [[1700000000000i64, 1700010800000i64], [3.5, 2.25]],
                },
            }),
            out
        );
    }

    #[test]
    fn test_forecast_frame_huge_timestamp() {
        let forecast = Forecast {
            list: vec![entry(9_000_000_000_000_000_000, 1.0, "clear sky"), entry(-9_000_000_000_000_000_000, 2.0, "")],
            city: None,
        };
        let frame = forecast_frame("A", Parameter::Temp, Units::Metric, &forecast, false).unwrap();

        assert_eq!(Values::Time(vec![i64::MAX, i64::MIN]), frame.field(FIELD_TIME).unwrap().values);
        assert_eq!(Values::Number(vec![1.0, 2.0]), frame.field(FIELD_VALUE).unwrap().values);
    }

    #[test]
    fn test_push_field_length_mismatch() {
        let mut frame = Frame::new("response");
        frame.push_field(Field::time("time", vec![1, 2])).unwrap();
        let res = frame.push_field(Field::number("value", vec![1.0]));

        assert_eq!(
            Err(FrameError::LengthMismatch {
                field: "value".to_owned(),
                expected: 2,
                actual: 1,
            }),
            res
        );
        assert_eq!(1, frame.fields.len());
    }
}
