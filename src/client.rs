//! Blocking HTTP client for the Open-Meteo current-weather endpoint.
//!
//! - Blocking client using `ureq` (no async).
//! - Keyless API; the site coordinates come from the building config.
//! - Only the fields the engine consumes (outside temperature + observation
//!   time) are deserialized.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::models::domain::WeatherSample;

const BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// Open-Meteo returns current_weather.time as ISO 8601 minutes, in GMT.
const OBSERVED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug)]
pub enum WeatherClientError {
    Transport(String),
    Http { status: u16 },
    Decode(serde_path_to_error::Error<serde_json::Error>),
    MissingTemperature,
}

impl core::fmt::Display for WeatherClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WeatherClientError::Transport(s) => write!(f, "transport error: {}", s),
            WeatherClientError::Http { status } => write!(f, "http {}", status),
            WeatherClientError::Decode(e) => write!(f, "decode error at {}: {}", e.path(), e.inner()),
            WeatherClientError::MissingTemperature => write!(f, "current_weather missing temperature"),
        }
    }
}

impl std::error::Error for WeatherClientError {}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current_weather: Option<CurrentWeather>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    time: Option<String>,
}

pub struct WeatherClient {
    agent: ureq::Agent,
    latitude: f64,
    longitude: f64,
}

impl WeatherClient {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();
        WeatherClient {
            agent: config.into(),
            latitude,
            longitude,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}?latitude={}&longitude={}&current_weather=true",
            BASE_URL, self.latitude, self.longitude
        )
    }

    /// Fetch the current outside temperature for the configured site.
    pub fn current_conditions(&self) -> Result<WeatherSample, WeatherClientError> {
        let mut resp = self
            .agent
            .get(&self.url())
            .call()
            .map_err(|e| WeatherClientError::Transport(e.to_string()))?;

        if resp.status() != http::StatusCode::OK {
            return Err(WeatherClientError::Http {
                status: resp.status().as_u16(),
            });
        }

        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| WeatherClientError::Transport(e.to_string()))?;
        parse_current_weather(&body)
    }
}

fn parse_current_weather(body: &str) -> Result<WeatherSample, WeatherClientError> {
    let mut de = serde_json::Deserializer::from_str(body);
    let parsed: ForecastResponse = serde_path_to_error::deserialize(&mut de).map_err(WeatherClientError::Decode)?;

    let current = parsed.current_weather.ok_or(WeatherClientError::MissingTemperature)?;
    let temperature_c = current.temperature.ok_or(WeatherClientError::MissingTemperature)?;
    let observed_at = current
        .time
        .as_deref()
        .and_then(parse_observed_at)
        .unwrap_or_else(Utc::now);

    Ok(WeatherSample {
        temperature_c,
        observed_at,
    })
}

fn parse_observed_at(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, OBSERVED_AT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
