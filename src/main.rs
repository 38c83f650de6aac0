pub mod models {
    pub mod domain;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod schema;
pub mod utils;
pub mod services {
    pub mod aggregate;
    pub mod occupancy;
    pub mod optimizer;
    pub mod realtime;
    pub mod reconcile;
    pub mod refs;
    pub mod simulate;
}

use crate::client::WeatherClient;
use crate::config::{BuildingConfig, Config};
use crate::services::realtime;
use crate::services::reconcile::AcceptanceLedger;
use crate::services::refs;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

pub fn run() -> Result<(), String> {
    // 1) Load runtime config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (poll={}s, debounce={}ms, weather_refresh={}s, weather_enabled={}, simulate={}, building={})",
        cfg.poll_interval.as_secs(),
        cfg.debounce_window.as_millis(),
        cfg.weather_refresh.as_secs(),
        cfg.weather_enabled,
        cfg.simulate_occupancy,
        cfg.building_config.display()
    );

    // 2) Load the building layout
    let building = BuildingConfig::load(&cfg.building_config)?;
    info!("Building config loaded ({} room(s))", building.rooms.len());

    // 3) Connect DB and apply pending migrations
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");
    apply_database_migrations(&mut conn)?;

    // 4) Sync reference data (rooms/appliance groups)
    refs::sync_building(&mut conn, &building)?;
    info!("Reference data sync complete");

    // 5) Weather collaborator, when configured
    let weather_client = match (cfg.weather_enabled, building.latitude, building.longitude) {
        (true, Some(latitude), Some(longitude)) => {
            info!("Weather enabled for site ({}, {})", latitude, longitude);
            Some(WeatherClient::new(latitude, longitude))
        }
        (true, _, _) => {
            warn!("Weather enabled but building config has no coordinates; bias step will be skipped");
            None
        }
        _ => {
            info!("Weather disabled via WEATHER_ENABLED=false");
            None
        }
    };

    // 6) Optimization loop
    let ledger = AcceptanceLedger::new();
    info!(
        "Starting optimization loop: rooms={}, interval={}s",
        building.rooms.len(),
        cfg.poll_interval.as_secs()
    );
    realtime::run_loop(&mut conn, &cfg, weather_client.as_ref(), &ledger)
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                env_file = Some(PathBuf::from(&s["--env-file=".len()..]));
            }
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            load_env_file(&path)?;
            Ok(Some(LoadedEnvFile { path, explicit: true }))
        }
        None => {
            let default_path = PathBuf::from(".env");
            if default_path.is_file() {
                load_env_file(&default_path)?;
                Ok(Some(LoadedEnvFile {
                    path: default_path,
                    explicit: false,
                }))
            } else {
                Ok(None)
            }
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in contents.lines().enumerate() {
        let Some((key, value)) = parse_env_assignment(line)
            .map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        // Values already supplied via the process environment win.
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let without_export = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);

    let (key, raw_value) = without_export
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.chars().any(|c| c.is_whitespace()) {
        return Err(format!("invalid environment variable name: {:?}", key));
    }

    let value = raw_value.trim();
    let value = if let Some(quoted) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
    {
        quoted.to_string()
    } else {
        // Unquoted values run to the first comment marker.
        value.split('#').next().unwrap_or_default().trim_end().to_string()
    };
    Ok(Some((key.to_string(), value)))
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "power-optimizer {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::parse_env_assignment;

    #[test]
    fn parses_plain_and_quoted_assignments() {
        assert_eq!(
            parse_env_assignment("DATABASE_URL=postgres://localhost/opt").unwrap(),
            Some(("DATABASE_URL".to_string(), "postgres://localhost/opt".to_string()))
        );
        assert_eq!(
            parse_env_assignment("export HOT_THRESHOLD_C=\"33.5\"").unwrap(),
            Some(("HOT_THRESHOLD_C".to_string(), "33.5".to_string()))
        );
        assert_eq!(
            parse_env_assignment("NAME='MTA building'").unwrap(),
            Some(("NAME".to_string(), "MTA building".to_string()))
        );
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        assert_eq!(parse_env_assignment("").unwrap(), None);
        assert_eq!(parse_env_assignment("# DEBOUNCE_MS=100").unwrap(), None);
        assert_eq!(
            parse_env_assignment("DEBOUNCE_MS=250 # fast site").unwrap(),
            Some(("DEBOUNCE_MS".to_string(), "250".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_assignments() {
        assert!(parse_env_assignment("JUSTAWORD").is_err());
        assert!(parse_env_assignment("BAD KEY=1").is_err());
        assert!(parse_env_assignment("=value").is_err());
    }
}
