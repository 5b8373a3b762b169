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

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Instant;

pub const OPERATION_QUERY: &str = "query";
pub const OPERATION_HEALTH: &str = "health";

const STATUS_SUCCESS: &str = "success";
const STATUS_ERROR: &str = "error";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OperationLabels {
    operation: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ErrorLabels {
    operation: String,
    error_type: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct DurationLabels {
    operation: String,
    status: String,
}

fn duration_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

/// Request metrics for the queries and health checks handled by a datasource.
///
/// All metrics are created and registered upon call to `DatasourceMetrics::new()`. The
/// `operation` label is either "query" or "health" and `error_type` is the kind of
/// error encountered, never the error message itself.
#[derive(Debug)]
pub struct DatasourceMetrics {
    requests: Family<OperationLabels, Counter>,
    errors: Family<ErrorLabels, Counter>,
    request_duration: Family<DurationLabels, Histogram>,
    requests_active: Gauge,
}

impl DatasourceMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let requests = Family::<OperationLabels, Counter>::default();
        let errors = Family::<ErrorLabels, Counter>::default();
        let request_duration: Family<DurationLabels, Histogram> = Family::new_with_constructor(duration_histogram);
        let requests_active = Gauge::default();

        reg.register("requests", "Total number of requests", requests.clone());
        reg.register("errors", "Total number of errors by type", errors.clone());
        reg.register(
            "request_duration_seconds",
            "Request duration in seconds",
            request_duration.clone(),
        );
        reg.register(
            "requests_active",
            "Current number of active requests",
            requests_active.clone(),
        );

        Self {
            requests,
            errors,
            request_duration,
            requests_active,
        }
    }

    /// Begin timing an operation. The returned timer should be finished with the
    /// outcome of the operation, an unfinished timer only decrements the active gauge.
    pub fn start(&self, operation: &'static str) -> RequestTimer<'_> {
        self.requests_active.inc();
        RequestTimer {
            metrics: self,
            operation,
            start: Instant::now(),
        }
    }

    fn record(&self, operation: &str, start: Instant, error_type: Option<&str>) {
        let status = match error_type {
            Some(kind) => {
                self.errors
                    .get_or_create(&ErrorLabels {
                        operation: operation.to_owned(),
                        error_type: kind.to_owned(),
                    })
                    .inc();
                STATUS_ERROR
            }
            None => STATUS_SUCCESS,
        };

        self.request_duration
            .get_or_create(&DurationLabels {
                operation: operation.to_owned(),
                status: status.to_owned(),
            })
            .observe(start.elapsed().as_secs_f64());

        self.requests
            .get_or_create(&OperationLabels {
                operation: operation.to_owned(),
            })
            .inc();
    }
}

#[derive(Debug)]
pub struct RequestTimer<'a> {
    metrics: &'a DatasourceMetrics,
    operation: &'static str,
    start: Instant,
}

impl<'a> RequestTimer<'a> {
    pub fn finish(self, error_type: Option<&str>) {
        self.metrics.record(self.operation, self.start, error_type);
    }
}

impl<'a> Drop for RequestTimer<'a> {
    fn drop(&mut self) {
        self.metrics.requests_active.dec();
    }
}
