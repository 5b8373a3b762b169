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

use crate::client::Forecast;
use crate::query::Parameter;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::error;
use std::fmt;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ArchiveError {
    Io(PathBuf, io::Error),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(p, e) => write!(f, "unable to write {}: {}", p.display(), e),
        }
    }
}

impl error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
        }
    }
}

/// Writes a plain text copy of each forecast fetched for a city to a directory, one
/// file per city per day. Later fetches on the same day replace the file.
#[derive(Debug, Clone)]
pub struct ForecastArchive {
    dir: PathBuf,
}

impl ForecastArchive {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        ForecastArchive { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the selected value of each entry in `forecast` and return the path written.
    pub async fn write(&self, city: &str, param: Parameter, forecast: &Forecast) -> Result<PathBuf, ArchiveError> {
        let path = self.path_for(city, Local::now().date_naive());
        let contents = render(city, param, forecast);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ArchiveError::Io(self.dir.clone(), e))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| ArchiveError::Io(path.clone(), e))?;

        Ok(path)
    }

    fn path_for(&self, city: &str, date: NaiveDate) -> PathBuf {
        let encoded_city = utf8_percent_encode(city, NON_ALPHANUMERIC);
        self.dir
            .join(format!("weather_{}_{}.txt", encoded_city, date.format("%Y-%m-%d")))
    }
}

fn render(city: &str, param: Parameter, forecast: &Forecast) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Weather data for {}", city);

    for entry in forecast.list.iter() {
        let time = match Utc.timestamp_opt(entry.dt, 0).single() {
            Some(t) => DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string(),
            None => entry.dt.to_string(),
        };

        let _ = writeln!(
            out,
            "Time: {}, Value: {:.2}, Description: {}",
            time,
            param.select(entry),
            entry.description()
        );
    }

    out
}
