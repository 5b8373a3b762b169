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

use crate::query::Units;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

pub const DEFAULT_FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

const REDACTED: &str = "REDACTED";

#[derive(Debug)]
pub enum ClientError {
    /// Transport failure. The request URL (and API key) is stripped from the error.
    Internal(reqwest::Error),
    InvalidUrl(String, String),
    Unauthorized,
    CityNotFound(String),
    RateLimited,
    Unexpected(StatusCode, Url),
    Decode(serde_json::Error),
}

impl ClientError {
    /// Short, stable name of the kind of error, suitable for use as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Internal(_) => "internal",
            Self::InvalidUrl(_, _) => "invalid_url",
            Self::Unauthorized => "unauthorized",
            Self::CityNotFound(_) => "city_not_found",
            Self::RateLimited => "rate_limited",
            Self::Unexpected(_, _) => "unexpected_status",
            Self::Decode(_) => "decode",
        }
    }

    /// HTTP status that best describes this error to the caller of a query.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::CityNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidUrl(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(u, e) => write!(f, "invalid forecast URL {}: {}", u, e),
            Self::Unauthorized => write!(f, "invalid API key: OpenWeather rejected the request (401)"),
            Self::CityNotFound(c) => write!(f, "city not found: {}", c),
            Self::RateLimited => write!(f, "OpenWeather API rate limit exceeded (429)"),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Decode(e) => write!(f, "unable to decode forecast response: {}", e),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for the 5 day / 3 hour forecast endpoint of the OpenWeather API.
#[derive(Debug)]
pub struct OpenWeatherClient {
    client: Client,
    forecast_url: Url,
    api_key: String,
}

impl OpenWeatherClient {
    const USER_AGENT: &'static str = "OpenWeather Datasource (https://github.com/56quarters/openweather_datasource)";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, forecast_url: &str, api_key: &str) -> Result<Self, ClientError> {
        let forecast_url = Url::parse(forecast_url).map_err(|e| ClientError::InvalidUrl(forecast_url.to_owned(), e.to_string()))?;

        Ok(OpenWeatherClient {
            client,
            forecast_url,
            api_key: api_key.to_owned(),
        })
    }

    pub async fn forecast(&self, city: &str, units: Units) -> Result<Forecast, ClientError> {
        let request_url = self.forecast_request_url(city, units);
        tracing::debug!(message = "making forecast request", url = %redact(&request_url), city = %city);

        let res = self
            .client
            .get(request_url.clone())
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(|e| ClientError::Internal(e.without_url()))?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        } else if status == StatusCode::NOT_FOUND {
            return Err(ClientError::CityNotFound(city.to_owned()));
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        } else if status != StatusCode::OK {
            return Err(ClientError::Unexpected(status, redact(&request_url)));
        }

        let body = res.bytes().await.map_err(|e| ClientError::Internal(e.without_url()))?;
        serde_json::from_slice::<Forecast>(&body).map_err(ClientError::Decode)
    }

    fn forecast_request_url(&self, city: &str, units: Units) -> Url {
        let mut url = self.forecast_url.clone();
        url.query_pairs_mut()
            .append_pair("q", city)
            .append_pair("appid", &self.api_key)
            .append_pair("units", units.as_str());

        url
    }
}

/// Copy of the URL with the API key replaced, safe to log or show to users.
fn redact(url: &Url) -> Url {
    let mut out = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == "appid" {
                (k.into_owned(), REDACTED.to_owned())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();

    out.query_pairs_mut().clear().extend_pairs(pairs);
    out
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Forecast {
    #[serde(default)]
    pub list: Vec<ForecastEntry>,
    #[serde(default)]
    pub city: Option<City>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct City {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ForecastEntry {
    pub dt: i64,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<Conditions>,
    #[serde(default)]
    pub wind: Wind,
    #[serde(default)]
    pub clouds: Clouds,
    #[serde(default)]
    pub rain: Option<Precipitation>,
    #[serde(default)]
    pub snow: Option<Precipitation>,
}

impl ForecastEntry {
    /// Description of the first weather condition, if there is one.
    pub fn description(&self) -> &str {
        self.weather.first().map(|w| w.description.as_str()).unwrap_or("")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MainReadings {
    pub temp: f64,
    #[serde(default)]
    pub feels_like: f64,
    #[serde(default)]
    pub temp_min: f64,
    #[serde(default)]
    pub temp_max: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default)]
    pub sea_level: f64,
    #[serde(default)]
    pub grnd_level: f64,
    #[serde(default)]
    pub humidity: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Conditions {
    pub id: i64,
    pub main: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub deg: f64,
    #[serde(default)]
    pub gust: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Clouds {
    #[serde(default)]
    pub all: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Precipitation {
    #[serde(rename = "3h", default)]
    pub three_hour: f64,
}
