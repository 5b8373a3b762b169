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

use clap::Parser;
use openweather_datasource::archive::ForecastArchive;
use openweather_datasource::datasource::Datasource;
use openweather_datasource::http::RequestContext;
use openweather_datasource::metrics::DatasourceMetrics;
use openweather_datasource::settings::PluginSettings;
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9783);
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const METRICS_PREFIX: &str = "openweather_datasource";

#[derive(Debug, Parser)]
#[clap(name = "openweather_datasource", version = clap::crate_version!())]
struct OpenWeatherDatasourceApplication {
    /// Data source instance settings to load, as JSON. Other flags override values
    /// from this file when given.
    #[clap(long)]
    settings_file: Option<PathBuf>,

    /// URL of the OpenWeather forecast endpoint [default: https://api.openweathermap.org/data/2.5/forecast]
    #[clap(long)]
    api_url: Option<String>,

    /// OpenWeather API key
    #[clap(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// City to request from the OpenWeather API when running health checks. If not set,
    /// health checks only verify that an API key is configured.
    #[clap(long)]
    health_check_city: Option<String>,

    /// Write a text copy of each forecast fetched to this directory, one file per city per day.
    #[clap(long)]
    archive_dir: Option<PathBuf>,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for fetching weather forecasts from the OpenWeather API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, openweather_datasource will bind to public address
    /// since the purpose is to answer queries from a dashboard running elsewhere.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

impl OpenWeatherDatasourceApplication {
    fn settings(&self) -> PluginSettings {
        let mut settings = match &self.settings_file {
            Some(path) => PluginSettings::from_file(path).unwrap_or_else(|e| {
                tracing::error!(message = "unable to load settings", path = %path.display(), error = %e);
                process::exit(1)
            }),
            None => PluginSettings::default(),
        };

        if let Some(url) = &self.api_url {
            settings.path = url.clone();
        }
        if let Some(key) = &self.api_key {
            settings.api_key = Some(key.clone());
        }
        if let Some(city) = &self.health_check_city {
            settings.health_check_city = Some(city.clone());
        }

        settings
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = OpenWeatherDatasourceApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let settings = opts.settings();
    if !settings.has_api_key() {
        tracing::warn!(message = "no API key configured, queries and health checks will fail");
    }

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let mut registry = Registry::with_prefix(METRICS_PREFIX);
    let metrics = DatasourceMetrics::new(&mut registry);
    let archive = opts.archive_dir.as_ref().map(|d| ForecastArchive::new(d.clone()));
    let api_url = settings.path.clone();

    let datasource = Datasource::new(settings, http_client, archive, metrics).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize datasource", api_url = %api_url, error = %e);
        process::exit(1)
    });

    let context = Arc::new(RequestContext::new(datasource, registry));
    let app = openweather_datasource::http::app(context.clone());
    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind, api_url = %api_url);

    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    context.datasource().dispose();
    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
