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

//! Dashboard data source backend for the OpenWeather forecast API
//!
//! ## Features
//!
//! `openweather_datasource` answers dashboard queries for weather forecasts by calling the
//! [OpenWeather 5 day / 3 hour forecast API][api] and returning the results as time-series
//! frames. Each query picks a city, a unit system, and a single forecast parameter made up of
//! a main parameter and a sub parameter. The following parameters are supported.
//!
//! * `main` - `temp`, `feels_like`, `temp_min`, `temp_max`, `pressure`, `sea_level`, `grnd_level`, `humidity`
//! * `wind` - `speed`, `deg`, `gust`
//! * `clouds` - `all` (may be left empty)
//! * `rain` - `3h` (may be left empty)
//! * `snow` - `3h` (may be left empty)
//!
//! Each successful query returns one frame with a `time` field, a `value` field, and
//! optionally a `description` field with the weather condition of each forecast entry.
//!
//! [api]: https://openweathermap.org/forecast5
//!
//! ## Build
//!
//! `openweather_datasource` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/openweather_datasource.git && cd openweather_datasource
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### API key
//!
//! An OpenWeather API key is required. It can be given with the `--api-key` flag, the
//! `OPENWEATHER_API_KEY` environment variable, or as `decryptedSecureJsonData.apiKey` in a
//! settings file passed with `--settings-file`.
//!
//! ```text
//! OPENWEATHER_API_KEY=... ./openweather_datasource --health-check-city London
//! ```
//!
//! ### Endpoints
//!
//! By default, `openweather_datasource` listens on port `9783`.
//!
//! * `POST /query` - Run one or more queries, e.g.
//!   `{"queries": [{"refId": "A", "city": "London", "mainParameter": "main", "subParameter": "temp", "units": "metric"}]}`
//! * `GET /health` - Check that an API key is configured and, if a health check city is set, that
//!   the API accepts it. Responds with a `200` when healthy and a `503` otherwise.
//! * `GET /metrics` - Prometheus metrics about queries and health checks.
//!

pub mod archive;
pub mod client;
pub mod datasource;
pub mod frame;
pub mod http;
pub mod metrics;
pub mod query;
pub mod settings;
