//! # Cache Writer
//!
//! Purpose: Small driver that caches an employee record with one pipeline
//! (hash set + expire + execute) and reads it back with a second one.
//!
//! Usage: `cache_writer [config.json] [employee-id] [ttl-seconds]`
//!
//! Without a config file the `default` connection points at 127.0.0.1:6379.
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cachepipe_client::coerce::field_map;
use cachepipe_client::{
    ConnectionConfig, ConnectionRegistry, Pipeline, PipelineError, ResultTag, StoreConfig,
};

const DEFAULT_CONFIG_PATH: &str = "store.json";
const DEFAULT_EMPLOYEE_ID: &str = "1";
const DEFAULT_TTL_SECS: u64 = 3600;

const REQUIRED_FIELDS: [&str; 2] = ["name", "gender"];
const OPTIONAL_FIELDS: [&str; 1] = ["address"];

struct Employee {
    name: String,
    gender: String,
    address: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let employee_id = args.next().unwrap_or_else(|| DEFAULT_EMPLOYEE_ID.to_string());
    let ttl = args
        .next()
        .and_then(|raw| raw.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_TTL_SECS));

    let registry = ConnectionRegistry::new(load_config(&config_path)?);
    let key = format!("employee:{}", employee_id);
    let employee = Employee {
        name: "Ann".to_string(),
        gender: "f".to_string(),
        address: String::new(),
    };

    write_employee(&registry, &key, &employee, ttl)?;
    let cached = read_employee(&registry, &key)?;
    for field in REQUIRED_FIELDS.iter().chain(OPTIONAL_FIELDS.iter()) {
        match cached.get(*field) {
            Some(value) => println!("{}: {}", field, value),
            None => println!("{}: <absent>", field),
        }
    }
    Ok(())
}

fn load_config(path: &str) -> Result<StoreConfig> {
    if Path::new(path).exists() {
        return StoreConfig::from_path(path).with_context(|| format!("loading {}", path));
    }
    info!(path, "config file not found, using local default connection");
    let default_name = StoreConfig::default().default_connection;
    Ok(StoreConfig::default().with_connection(default_name, ConnectionConfig::default()))
}

fn write_employee(
    registry: &ConnectionRegistry,
    key: &str,
    employee: &Employee,
    ttl: Duration,
) -> Result<()> {
    let mut pipe = Pipeline::new(registry, None)?;
    let mut fields = vec![("name", employee.name.as_str()), ("gender", employee.gender.as_str())];
    if !employee.address.is_empty() {
        fields.push(("address", employee.address.as_str()));
    }
    pipe.hash_multi_set(key, fields)?;
    pipe.expire(key, ttl)?;
    pipe.execute().context("caching employee")?;

    if pipe.take_hash_multi_set() != "OK" {
        warn!(key, "store did not acknowledge HMSET");
    }
    if !pipe.take_expire() {
        warn!(key, "expiry was not applied");
    }
    info!(key, ttl_secs = ttl.as_secs(), "cached employee");
    Ok(())
}

fn read_employee(
    registry: &ConnectionRegistry,
    key: &str,
) -> Result<HashMap<String, String>> {
    let mut pipe = Pipeline::new(registry, None)?;
    pipe.hash_get_all(key)?;
    pipe.execute().context("reading employee")?;

    let raw = pipe.take(ResultTag::HashGetAll);
    match field_map(&raw, &REQUIRED_FIELDS, &OPTIONAL_FIELDS) {
        Ok(fields) => Ok(fields),
        Err(PipelineError::MissingField(missing)) => {
            warn!(key, missing = ?missing.missing(), "cached employee is incomplete");
            Ok(missing.into_partial())
        }
        Err(err) => Err(err.into()),
    }
}
