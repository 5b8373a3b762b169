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

//! Queries and health checks against a mock OpenWeather API.

use openweather_datasource::archive::ForecastArchive;
use openweather_datasource::client::{ClientError, OpenWeatherClient};
use openweather_datasource::datasource::{DataQuery, Datasource, HealthStatus, QueryDataRequest};
use openweather_datasource::frame::{Values, FIELD_DESCRIPTION, FIELD_TIME, FIELD_VALUE};
use openweather_datasource::metrics::DatasourceMetrics;
use openweather_datasource::query::Units;
use openweather_datasource::settings::PluginSettings;
use prometheus_client::registry::Registry;
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FORECAST_PATH: &str = "/data/2.5/forecast";
const API_KEY: &str = "test-key";

fn sample_forecast() -> serde_json::Value {
    json!({
        "cod": "200",
        "message": 0,
        "cnt": 3,
        "list": [
            {
                "dt": 1700000000,
                "main": {"temp": 8.1, "feels_like": 6.4, "temp_min": 7.9, "temp_max": 8.1, "pressure": 1012,
                         "sea_level": 1012, "grnd_level": 1009, "humidity": 81},
                "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}],
                "clouds": {"all": 75},
                "wind": {"speed": 4.6, "deg": 240, "gust": 9.8},
                "visibility": 10000,
                "pop": 0.1,
                "dt_txt": "2023-11-14 22:13:20"
            },
            {
                "dt": 1700010800,
                "main": {"temp": 7.4, "feels_like": 5.2, "temp_min": 7.4, "temp_max": 7.4, "pressure": 1013,
                         "sea_level": 1013, "grnd_level": 1010, "humidity": 85},
                "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10n"}],
                "clouds": {"all": 90},
                "wind": {"speed": 5.1, "deg": 250},
                "rain": {"3h": 0.57},
                "dt_txt": "2023-11-15 01:13:20"
            },
            {
                "dt": 1700021600,
                "main": {"temp": 6.9, "feels_like": 4.8, "temp_min": 6.9, "temp_max": 6.9, "pressure": 1014,
                         "sea_level": 1014, "grnd_level": 1011, "humidity": 88},
                "weather": [{"id": 804, "main": "Clouds", "description": "overcast clouds", "icon": "04n"}],
                "clouds": {"all": 100},
                "wind": {"speed": 4.0, "deg": 255, "gust": 8.2},
                "dt_txt": "2023-11-15 04:13:20"
            }
        ],
        "city": {"id": 2643743, "name": "London", "country": "GB"}
    })
}

fn settings(server: &MockServer, api_key: Option<&str>, health_check_city: Option<&str>) -> PluginSettings {
    PluginSettings {
        path: format!("{}{}", server.uri(), FORECAST_PATH),
        api_key: api_key.map(|k| k.to_owned()),
        health_check_city: health_check_city.map(|c| c.to_owned()),
    }
}

fn datasource(settings: PluginSettings, archive: Option<PathBuf>) -> (Datasource, Registry) {
    let mut reg = Registry::with_prefix("test");
    let metrics = DatasourceMetrics::new(&mut reg);
    let ds = Datasource::new(settings, Client::new(), archive.map(ForecastArchive::new), metrics).unwrap();
    (ds, reg)
}

async fn mount_forecast(server: &MockServer, city: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .and(query_param("q", city))
        .and(query_param("appid", API_KEY))
        .respond_with(response)
        .mount(server)
        .await;
}

fn temp_query(ref_id: &str, city: &str) -> DataQuery {
    DataQuery::new(json!({
        "refId": ref_id,
        "city": city,
        "mainParameter": "main",
        "subParameter": "temp",
        "units": "metric",
    }))
}

// ============================================================================
// Client
// ============================================================================

#[tokio::test]
async fn test_client_forecast_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .and(query_param("q", "London"))
        .and(query_param("appid", API_KEY))
        .and(query_param("units", "imperial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_forecast()))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenWeatherClient::new(Client::new(), &format!("{}{}", server.uri(), FORECAST_PATH), API_KEY).unwrap();
    let forecast = client.forecast("London", Units::Imperial).await.unwrap();

    assert_eq!(3, forecast.list.len());
    assert_eq!("London", forecast.city.unwrap().name);
}

#[tokio::test]
async fn test_client_status_mapping() {
    let server = MockServer::start().await;
    mount_forecast(&server, "Nowhere", ResponseTemplate::new(404)).await;
    mount_forecast(&server, "Busy", ResponseTemplate::new(429)).await;
    mount_forecast(&server, "Broken", ResponseTemplate::new(500)).await;

    let client = OpenWeatherClient::new(Client::new(), &format!("{}{}", server.uri(), FORECAST_PATH), API_KEY).unwrap();

    let res = client.forecast("Nowhere", Units::Metric).await;
    assert!(matches!(res, Err(ClientError::CityNotFound(c)) if c == "Nowhere"));

    let res = client.forecast("Busy", Units::Metric).await;
    assert!(matches!(res, Err(ClientError::RateLimited)));

    let res = client.forecast("Broken", Units::Metric).await;
    match res {
        Err(e @ ClientError::Unexpected(_, _)) => assert!(!e.to_string().contains(API_KEY)),
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_client_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"cod": 401, "message": "Invalid API key"})))
        .mount(&server)
        .await;

    let client = OpenWeatherClient::new(Client::new(), &format!("{}{}", server.uri(), FORECAST_PATH), "wrong").unwrap();
    let res = client.forecast("London", Units::Metric).await;

    assert!(matches!(res, Err(ClientError::Unauthorized)));
}

#[tokio::test]
async fn test_client_decode_error() {
    let server = MockServer::start().await;
    mount_forecast(
        &server,
        "London",
        ResponseTemplate::new(200).set_body_string("<html>not json</html>"),
    )
    .await;

    let client = OpenWeatherClient::new(Client::new(), &format!("{}{}", server.uri(), FORECAST_PATH), API_KEY).unwrap();
    let res = client.forecast("London", Units::Metric).await;

    assert!(matches!(res, Err(ClientError::Decode(_))));
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_query_values_match_forecast() {
    let server = MockServer::start().await;
    mount_forecast(&server, "London", ResponseTemplate::new(200).set_body_json(sample_forecast())).await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), None);
    let res = ds.query(&temp_query("A", "London")).await;

    assert_eq!(200, res.status);
    assert_eq!(None, res.error);
    assert_eq!(1, res.frames.len());

    let frame = &res.frames[0];
    assert_eq!(
        Values::Time(vec![1700000000000, 1700010800000, 1700021600000]),
        frame.field(FIELD_TIME).unwrap().values
    );
    assert_eq!(
        Values::Number(vec![8.1, 7.4, 6.9]),
        frame.field(FIELD_VALUE).unwrap().values
    );
    assert_eq!(
        Some("main - temp".to_owned()),
        frame.field(FIELD_VALUE).unwrap().config.display_name
    );
}

#[tokio::test]
async fn test_query_optional_fields_read_as_zero() {
    let server = MockServer::start().await;
    mount_forecast(&server, "London", ResponseTemplate::new(200).set_body_json(sample_forecast())).await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), None);

    let rain = ds
        .query(&DataQuery::new(json!({"refId": "R", "city": "London", "mainParameter": "rain"})))
        .await;
    assert_eq!(
        Values::Number(vec![0.0, 0.57, 0.0]),
        rain.frames[0].field(FIELD_VALUE).unwrap().values
    );

    let gust = ds
        .query(&DataQuery::new(json!({
            "refId": "G",
            "city": "London",
            "mainParameter": "wind",
            "subParameter": "gust",
            "withDescription": true,
        })))
        .await;
    assert_eq!(
        Values::Number(vec![9.8, 0.0, 8.2]),
        gust.frames[0].field(FIELD_VALUE).unwrap().values
    );
    assert_eq!(
        Values::String(vec![
            "broken clouds".to_owned(),
            "light rain".to_owned(),
            "overcast clouds".to_owned()
        ]),
        gust.frames[0].field(FIELD_DESCRIPTION).unwrap().values
    );
}

#[tokio::test]
async fn test_query_data_errors_are_per_ref_id() {
    let server = MockServer::start().await;
    mount_forecast(&server, "London", ResponseTemplate::new(200).set_body_json(sample_forecast())).await;
    mount_forecast(&server, "Atlantis", ResponseTemplate::new(404)).await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), None);
    let req = QueryDataRequest {
        queries: vec![
            temp_query("A", "London"),
            temp_query("B", "Atlantis"),
            DataQuery::new(json!({"refId": "C", "city": 12})),
        ],
    };

    let res = ds.query_data(&req).await;

    assert_eq!(3, res.results.len());
    assert_eq!(200, res.results["A"].status);
    assert_eq!(1, res.results["A"].frames.len());
    assert_eq!(404, res.results["B"].status);
    assert_eq!(Some("city not found: Atlantis".to_owned()), res.results["B"].error);
    assert_eq!(400, res.results["C"].status);
}

#[tokio::test]
async fn test_query_rate_limited() {
    let server = MockServer::start().await;
    mount_forecast(&server, "London", ResponseTemplate::new(429)).await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), None);
    let res = ds.query(&temp_query("A", "London")).await;

    assert_eq!(429, res.status);
    assert!(res.frames.is_empty());
}

#[tokio::test]
async fn test_query_empty_city_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_forecast()))
        .expect(0)
        .mount(&server)
        .await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), None);
    let res = ds.query(&temp_query("A", "")).await;

    assert_eq!(200, res.status);
    assert!(res.frames.is_empty());
    assert!(res.error.is_none());
}

#[tokio::test]
async fn test_query_writes_archive() {
    let server = MockServer::start().await;
    mount_forecast(&server, "London", ResponseTemplate::new(200).set_body_json(sample_forecast())).await;

    let tmp = tempfile::tempdir().unwrap();
    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), Some(tmp.path().to_owned()));
    let res = ds.query(&temp_query("A", "London")).await;
    assert_eq!(200, res.status);

    let files: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(1, files.len());

    let contents = std::fs::read_to_string(&files[0]).unwrap();
    assert_eq!(4, contents.lines().count());
    assert!(contents.contains("Value: 7.40, Description: light rain"));
}

#[tokio::test]
async fn test_query_archive_failure_still_answers() {
    let server = MockServer::start().await;
    mount_forecast(&server, "London", ResponseTemplate::new(200).set_body_json(sample_forecast())).await;

    // Archive directory below a regular file can never be created.
    let file = tempfile::NamedTempFile::new().unwrap();
    let (ds, _reg) = datasource(
        settings(&server, Some(API_KEY), None),
        Some(file.path().join("archive")),
    );
    let res = ds.query(&temp_query("A", "London")).await;

    assert_eq!(200, res.status);
    assert_eq!(None, res.error);
    assert_eq!(1, res.frames.len());
}

#[tokio::test]
async fn test_query_upstream_unauthorized() {
    let server = MockServer::start().await;
    mount_forecast(&server, "London", ResponseTemplate::new(401)).await;

    let (ds, reg) = datasource(settings(&server, Some(API_KEY), None), None);
    let res = ds.query(&temp_query("A", "London")).await;

    assert_eq!(401, res.status);
    assert!(res.error.unwrap().starts_with("invalid API key"));

    let mut out = String::new();
    prometheus_client::encoding::text::encode(&mut out, &reg).unwrap();
    assert!(out.contains("test_errors_total{operation=\"query\",error_type=\"unauthorized\"} 1"));
}

#[tokio::test]
async fn test_query_decode_error() {
    let server = MockServer::start().await;
    mount_forecast(
        &server,
        "London",
        ResponseTemplate::new(200).set_body_string("<html>not json</html>"),
    )
    .await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), None);
    let res = ds.query(&temp_query("A", "London")).await;

    assert_eq!(502, res.status);
    assert!(res.error.unwrap().starts_with("unable to decode forecast response"));
}

#[tokio::test]
async fn test_connect_error_hides_api_key() {
    // Nothing listens on port 1, the connection is refused.
    let settings = PluginSettings {
        path: format!("http://127.0.0.1:1{}", FORECAST_PATH),
        api_key: Some(API_KEY.to_owned()),
        health_check_city: Some("London".to_owned()),
    };
    let (ds, reg) = datasource(settings, None);

    let res = ds.query(&temp_query("A", "London")).await;
    assert_eq!(502, res.status);
    assert!(res.frames.is_empty());
    let message = res.error.unwrap();
    assert!(!message.is_empty());
    assert!(!message.contains(API_KEY));

    let health = ds.check_health().await;
    assert_eq!(HealthStatus::Error, health.status);
    assert!(!health.message.contains(API_KEY));

    let mut out = String::new();
    prometheus_client::encoding::text::encode(&mut out, &reg).unwrap();
    assert!(out.contains("test_errors_total{operation=\"query\",error_type=\"internal\"} 1"));
}

#[tokio::test]
async fn test_query_out_of_range_timestamp() {
    let server = MockServer::start().await;
    mount_forecast(
        &server,
        "London",
        ResponseTemplate::new(200).set_body_json(json!({"list": [{"dt": 9000000000000000000i64, "main": {"temp": 1.0}}]})),
    )
    .await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), None);
    let res = ds.query(&temp_query("A", "London")).await;

    assert_eq!(200, res.status);
    assert_eq!(Values::Time(vec![i64::MAX]), res.frames[0].field(FIELD_TIME).unwrap().values);
    assert_eq!(Values::Number(vec![1.0]), res.frames[0].field(FIELD_VALUE).unwrap().values);
}

#[tokio::test]
async fn test_query_data_duplicate_ref_id_keeps_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_forecast()))
        .expect(0)
        .mount(&server)
        .await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), None), None);
    let req = QueryDataRequest {
        queries: vec![
            temp_query("A", ""),
            temp_query("A", "London"),
            DataQuery::new(json!({"city": ""})),
            DataQuery::new(json!({"city": "London", "mainParameter": "main", "subParameter": "temp"})),
        ],
    };

    let res = ds.query_data(&req).await;

    assert_eq!(2, res.results.len());
    assert_eq!(200, res.results["A"].status);
    assert!(res.results["A"].frames.is_empty());
    assert_eq!(200, res.results[""].status);
    assert!(res.results[""].frames.is_empty());
}

// ============================================================================
// Health checks
// ============================================================================

#[tokio::test]
async fn test_health_missing_api_key_never_probes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_forecast()))
        .expect(0)
        .mount(&server)
        .await;

    let (ds, _reg) = datasource(settings(&server, None, Some("London")), None);
    let res = ds.check_health().await;

    assert_eq!(HealthStatus::Error, res.status);
    assert_eq!("API key is missing", res.message);
}

#[tokio::test]
async fn test_health_probe_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .and(query_param("q", "London"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_forecast()))
        .expect(1)
        .mount(&server)
        .await;

    let (ds, _reg) = datasource(settings(&server, Some(API_KEY), Some("London")), None);
    let res = ds.check_health().await;

    assert_eq!(HealthStatus::Ok, res.status);
}

#[tokio::test]
async fn test_health_probe_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (ds, reg) = datasource(settings(&server, Some("expired"), Some("London")), None);
    let res = ds.check_health().await;

    assert_eq!(HealthStatus::Error, res.status);
    assert!(res.message.starts_with("invalid API key"));

    let mut out = String::new();
    prometheus_client::encoding::text::encode(&mut out, &reg).unwrap();
    assert!(out.contains("test_errors_total{operation=\"health\",error_type=\"unauthorized\"} 1"));
}
