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

use crate::archive::ForecastArchive;
use crate::client::{ClientError, OpenWeatherClient};
use crate::frame::{forecast_frame, Frame, FrameError};
use crate::metrics::{DatasourceMetrics, OPERATION_HEALTH, OPERATION_QUERY};
use crate::query::{Parameter, QueryError, QueryModel, Units};
use crate::settings::PluginSettings;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error;
use std::fmt;
use tracing::{Instrument, Level};

const MESSAGE_MISSING_API_KEY: &str = "API key is missing";
const MESSAGE_HEALTHY: &str = "Data source is working";

#[derive(Debug)]
pub enum DatasourceError {
    Query(QueryError),
    MissingApiKey,
    Client(ClientError),
    Frame(FrameError),
}

impl DatasourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Query(e) => e.kind(),
            Self::MissingApiKey => "missing_api_key",
            Self::Client(e) => e.kind(),
            Self::Frame(_) => "frame",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Query(_) => StatusCode::BAD_REQUEST,
            Self::MissingApiKey => StatusCode::UNAUTHORIZED,
            Self::Client(e) => e.status(),
            Self::Frame(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for DatasourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(e) => write!(f, "{}", e),
            Self::MissingApiKey => f.write_str(MESSAGE_MISSING_API_KEY),
            Self::Client(e) => write!(f, "{}", e),
            Self::Frame(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for DatasourceError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Query(e) => Some(e),
            Self::MissingApiKey => None,
            Self::Client(e) => Some(e),
            Self::Frame(e) => Some(e),
        }
    }
}

impl From<QueryError> for DatasourceError {
    fn from(e: QueryError) -> Self {
        Self::Query(e)
    }
}

impl From<ClientError> for DatasourceError {
    fn from(e: ClientError) -> Self {
        Self::Client(e)
    }
}

impl From<FrameError> for DatasourceError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

/// A single query as sent by the dashboard: a JSON object with a `refId` and the
/// fields of the query model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct DataQuery {
    json: serde_json::Value,
}

impl DataQuery {
    pub fn new(json: serde_json::Value) -> Self {
        DataQuery { json }
    }

    /// Ref ID of the query, read without decoding the rest of the model so that
    /// malformed queries can still be answered under their own ID.
    pub fn ref_id(&self) -> &str {
        self.json.get("refId").and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn json(&self) -> &serde_json::Value {
        &self.json
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct QueryDataRequest {
    #[serde(default)]
    pub queries: Vec<DataQuery>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DataResponse {
    pub status: u16,
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataResponse {
    pub fn empty() -> Self {
        DataResponse {
            status: StatusCode::OK.as_u16(),
            frames: Vec::new(),
            error: None,
        }
    }

    pub fn frame(frame: Frame) -> Self {
        DataResponse {
            status: StatusCode::OK.as_u16(),
            frames: vec![frame],
            error: None,
        }
    }

    pub fn error<S: Into<String>>(status: StatusCode, message: S) -> Self {
        DataResponse {
            status: status.as_u16(),
            frames: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Responses for each query of a request, keyed by ref ID.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct QueryDataResponse {
    pub results: BTreeMap<String, DataResponse>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckHealthResult {
    pub status: HealthStatus,
    pub message: String,
}

impl CheckHealthResult {
    pub fn ok<S: Into<String>>(message: S) -> Self {
        CheckHealthResult {
            status: HealthStatus::Ok,
            message: message.into(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        CheckHealthResult {
            status: HealthStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

/// Executes queries and health checks for a single data source instance.
///
/// A datasource holds no mutable state, it can be shared between any number of
/// concurrent requests.
#[derive(Debug)]
pub struct Datasource {
    settings: PluginSettings,
    client: OpenWeatherClient,
    archive: Option<ForecastArchive>,
    metrics: DatasourceMetrics,
}

impl Datasource {
    pub fn new(
        settings: PluginSettings,
        http_client: Client,
        archive: Option<ForecastArchive>,
        metrics: DatasourceMetrics,
    ) -> Result<Self, ClientError> {
        let api_key = settings.api_key.clone().unwrap_or_default();
        let client = OpenWeatherClient::new(http_client, &settings.path, &api_key)?;

        Ok(Datasource {
            settings,
            client,
            archive,
            metrics,
        })
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// Run each query in the request, one after another. A failed query only
    /// affects its own response. Queries that repeat a ref ID already answered in
    /// the same request are skipped, the first response for a ref ID is kept.
    pub async fn query_data(&self, req: &QueryDataRequest) -> QueryDataResponse {
        let mut response = QueryDataResponse::default();

        for q in req.queries.iter() {
            if response.results.contains_key(q.ref_id()) {
                tracing::warn!(message = "skipping query with duplicate ref ID", ref_id = %q.ref_id());
                continue;
            }

            let res = self.query(q).await;
            response.results.insert(q.ref_id().to_owned(), res);
        }

        response
    }

    pub async fn query(&self, query: &DataQuery) -> DataResponse {
        let timer = self.metrics.start(OPERATION_QUERY);
        let span = tracing::span!(Level::DEBUG, "openweather_query", ref_id = %query.ref_id());

        match self.run_query(query).instrument(span).await {
            Ok(res) => {
                timer.finish(None);
                res
            }
            Err(e) => {
                timer.finish(Some(e.kind()));
                tracing::warn!(message = "query failed", ref_id = %query.ref_id(), error = %e);
                DataResponse::error(e.status(), e.to_string())
            }
        }
    }

    async fn run_query(&self, query: &DataQuery) -> Result<DataResponse, DatasourceError> {
        let model = QueryModel::from_json(query.json())?;
        if model.city.trim().is_empty() {
            tracing::debug!(message = "skipping query without a city", ref_id = %query.ref_id());
            return Ok(DataResponse::empty());
        }

        if !self.settings.has_api_key() {
            return Err(DatasourceError::MissingApiKey);
        }

        let units = Units::parse(&model.units)?;
        let param = Parameter::parse(&model.main_parameter, &model.sub_parameter)?;

        let forecast = self
            .client
            .forecast(&model.city, units)
            .instrument(tracing::span!(Level::DEBUG, "openweather_forecast"))
            .await?;

        tracing::debug!(
            message = "fetched forecast",
            city = %model.city,
            parameter = %param.display_name(),
            entries = forecast.list.len(),
        );

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.write(&model.city, param, &forecast).await {
                tracing::error!(message = "failed to write forecast archive", city = %model.city, error = %e);
            }
        }

        let frame = forecast_frame(query.ref_id(), param, units, &forecast, model.with_description)?;
        Ok(DataResponse::frame(frame))
    }

    /// Verify that an API key is configured and, if a health check city is set, that the
    /// OpenWeather API accepts a request for it.
    pub async fn check_health(&self) -> CheckHealthResult {
        let timer = self.metrics.start(OPERATION_HEALTH);

        if !self.settings.has_api_key() {
            timer.finish(Some(DatasourceError::MissingApiKey.kind()));
            return CheckHealthResult::error(MESSAGE_MISSING_API_KEY);
        }

        if let Some(city) = &self.settings.health_check_city {
            if let Err(e) = self
                .client
                .forecast(city, Units::default())
                .instrument(tracing::span!(Level::DEBUG, "openweather_health"))
                .await
            {
                timer.finish(Some(e.kind()));
                tracing::warn!(message = "health check failed", city = %city, error = %e);
                return CheckHealthResult::error(e.to_string());
            }
        }

        timer.finish(None);
        CheckHealthResult::ok(MESSAGE_HEALTHY)
    }

    /// Release resources held by this instance before it is replaced or the process exits.
    pub fn dispose(&self) {
        tracing::info!(message = "disposing datasource", path = %self.settings.path);
    }
}
