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

use crate::datasource::{CheckHealthResult, Datasource, QueryDataRequest, QueryDataResponse};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const OPENMETRICS_TEXT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Global state shared between all HTTP requests.
#[derive(Debug)]
pub struct RequestContext {
    datasource: Datasource,
    registry: Registry,
}

impl RequestContext {
    pub fn new(datasource: Datasource, registry: Registry) -> Self {
        Self { datasource, registry }
    }

    pub fn datasource(&self) -> &Datasource {
        &self.datasource
    }
}

/// Routes for the query, health check, and metrics endpoints. Paths that exist but are
/// requested with the wrong method get a 405, anything else a 404.
pub fn app(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn query_handler(
    State(context): State<Arc<RequestContext>>,
    Json(req): Json<QueryDataRequest>,
) -> Json<QueryDataResponse> {
    Json(context.datasource.query_data(&req).await)
}

async fn health_handler(State(context): State<Arc<RequestContext>>) -> (StatusCode, Json<CheckHealthResult>) {
    let res = context.datasource.check_health().await;
    let status = if res.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(res))
}

async fn metrics_handler(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_TEXT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
