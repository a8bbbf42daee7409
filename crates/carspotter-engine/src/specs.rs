use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{Map, Value};

use crate::util::{non_empty_env, response_json_or_error};

pub const API_NINJAS_DEFAULT_BASE: &str = "https://api.api-ninjas.com/v1";

/// Third-party specification source; an empty map means "no match".
pub trait SpecLookup: Send + Sync {
    fn name(&self) -> &str;
    fn lookup_specs(&self, make: &str, model: &str, year: &str) -> Result<Map<String, Value>>;
}

pub struct ApiNinjasLookup {
    api_base: String,
    http: HttpClient,
}

impl ApiNinjasLookup {
    pub fn new() -> Self {
        Self {
            api_base: non_empty_env("CARSPOTTER_SPECS_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| API_NINJAS_DEFAULT_BASE.to_string()),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        non_empty_env("API_NINJAS_KEY")
    }

    fn query(make: &str, model: &str, year: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("make", make.trim().to_string()),
            ("model", model.trim().to_string()),
        ];
        let year = year.trim();
        if year.parse::<u32>().is_ok() {
            query.push(("year", year.to_string()));
        }
        query
    }
}

impl Default for ApiNinjasLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecLookup for ApiNinjasLookup {
    fn name(&self) -> &str {
        "api_ninjas"
    }

    fn lookup_specs(&self, make: &str, model: &str, year: &str) -> Result<Map<String, Value>> {
        let Some(api_key) = Self::api_key() else {
            bail!("API_NINJAS_KEY not set");
        };
        let endpoint = format!("{}/cars", self.api_base);
        let response = self
            .http
            .get(&endpoint)
            .header("X-Api-Key", api_key)
            .query(&Self::query(make, model, year))
            .timeout(Duration::from_secs(20))
            .send()
            .with_context(|| format!("spec lookup request failed ({endpoint})"))?;
        let payload = response_json_or_error("api_ninjas", response)?;
        Ok(first_match(payload))
    }
}

/// The service answers with a list of candidate trims; the first one wins.
fn first_match(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Array(rows) => rows
            .into_iter()
            .find_map(|row| match row {
                Value::Object(obj) => Some(obj),
                _ => None,
            })
            .unwrap_or_default(),
        Value::Object(obj) => obj,
        _ => Map::new(),
    }
}

/// In-memory lookup keyed by lowercase `make|model|year`.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    rows: BTreeMap<String, Map<String, Value>>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, make: &str, model: &str, year: &str, specs: Map<String, Value>) {
        self.rows.insert(Self::key(make, model, year), specs);
    }

    fn key(make: &str, model: &str, year: &str) -> String {
        format!("{}|{}|{}", make.trim(), model.trim(), year.trim()).to_ascii_lowercase()
    }
}

impl SpecLookup for StaticLookup {
    fn name(&self) -> &str {
        "static"
    }

    fn lookup_specs(&self, make: &str, model: &str, year: &str) -> Result<Map<String, Value>> {
        Ok(self
            .rows
            .get(&Self::key(make, model, year))
            .cloned()
            .unwrap_or_default())
    }
}
