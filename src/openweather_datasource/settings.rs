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

use crate::client::DEFAULT_FORECAST_URL;
use serde::Deserialize;
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::io;
use std::path::Path;

const SECURE_API_KEY: &str = "apiKey";

#[derive(Debug)]
pub enum SettingsError {
    Io(io::Error),
    Malformed(serde_json::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "unable to read settings: {}", e),
            Self::Malformed(e) => write!(f, "unable to parse settings: {}", e),
        }
    }
}

impl error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Malformed(e) => Some(e),
        }
    }
}

/// Settings for a data source instance, as entered in the config editor.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSettings {
    /// Full URL of the forecast endpoint.
    pub path: String,
    /// Decrypted OpenWeather API key.
    pub api_key: Option<String>,
    /// City to request when running a health check. No request is made when unset.
    pub health_check_city: Option<String>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        PluginSettings {
            path: DEFAULT_FORECAST_URL.to_owned(),
            api_key: None,
            health_check_city: None,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct InstanceSettings {
    json_data: JsonData,
    decrypted_secure_json_data: HashMap<String, String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct JsonData {
    path: Option<String>,
    health_check_city: Option<String>,
}

impl PluginSettings {
    /// Load settings from an instance settings document, e.g.
    ///
    /// ```text
    /// {"jsonData": {"path": "..."}, "decryptedSecureJsonData": {"apiKey": "..."}}
    /// ```
    ///
    /// Anything not present falls back to the default.
    pub fn from_instance_json(bytes: &[u8]) -> Result<Self, SettingsError> {
        let instance: InstanceSettings = serde_json::from_slice(bytes).map_err(SettingsError::Malformed)?;
        let mut secure = instance.decrypted_secure_json_data;

        Ok(PluginSettings {
            path: instance
                .json_data
                .path
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FORECAST_URL.to_owned()),
            api_key: secure.remove(SECURE_API_KEY),
            health_check_city: instance.json_data.health_check_city.filter(|c| !c.trim().is_empty()),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let bytes = std::fs::read(path).map_err(SettingsError::Io)?;
        Self::from_instance_json(&bytes)
    }

    /// True if an API key is set and isn't blank.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().map(|k| !k.trim().is_empty()).unwrap_or(false)
    }
}
