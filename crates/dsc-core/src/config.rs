//! Datastore configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Configuration for one datastore target.
///
/// `descriptor` is the human readable endpoint template, e.g.
/// `[username]:[password]@tcp(127.0.0.1:3306)/[dbname]`. It is what error
/// messages show; the actual DSN handed to the driver is produced by
/// [`Config::dsn_descriptor`], which fills in the `[name]` placeholders.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// methods, [`Config::from_json`] or [`Default::default()`] to construct
/// instances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct Config {
    /// Name of the registered driver, also used for dialect lookup.
    pub driver_name: String,

    /// Endpoint template with `[name]` placeholders.
    pub descriptor: String,

    /// Free-form parameters used by placeholders and tuning keys.
    #[serde(deserialize_with = "scalar_map")]
    pub parameters: HashMap<String, String>,

    /// Statements executed, in order, on every freshly opened handle.
    #[serde(rename = "initSQL", alias = "initSql")]
    pub init_sql: Vec<String>,

    /// Maximum number of connections checked out at once (0 means 1).
    pub max_pool_size: u32,

    /// Username substituted for `[username]`.
    pub username: Option<String>,

    /// Password substituted for `[password]`.
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Config {
    /// Create a new configuration for a driver and endpoint descriptor.
    pub fn new(driver_name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            driver_name: driver_name.into(),
            descriptor: descriptor.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Append an initialization statement.
    #[must_use]
    pub fn init_sql(mut self, statement: impl Into<String>) -> Self {
        self.init_sql.push(statement.into());
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set a parameter.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.insert(key.into(), value.to_string());
        self
    }

    /// Set the credentials used for `[username]` and `[password]`.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Check if a parameter is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    /// Get a parameter as a string.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Get a parameter as an integer, falling back to `default` when it is
    /// missing or not a number.
    #[must_use]
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.parameters
            .get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a parameter as a duration expressed in multiples of `unit`.
    ///
    /// `default` is expressed in the same unit.
    #[must_use]
    pub fn get_duration(&self, key: &str, unit: Duration, default: u32) -> Duration {
        let count = self
            .parameters
            .get(key)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(default);
        unit * count
    }

    /// Effective pool capacity.
    #[must_use]
    pub fn effective_pool_size(&self) -> usize {
        self.max_pool_size.max(1) as usize
    }

    /// Expand the descriptor into the DSN handed to the driver.
    pub fn dsn_descriptor(&self) -> Result<String> {
        let mut dsn = String::with_capacity(self.descriptor.len());
        let mut rest = self.descriptor.as_str();

        while let Some(start) = rest.find('[') {
            dsn.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find(']').ok_or_else(|| {
                Error::Config(format!(
                    "unterminated placeholder in {} descriptor {}",
                    self.driver_name, self.descriptor
                ))
            })?;
            let name = &after[..end];
            let value = self.placeholder(name).ok_or_else(|| {
                Error::Config(format!(
                    "unresolved placeholder [{name}] in {} descriptor {}",
                    self.driver_name, self.descriptor
                ))
            })?;
            dsn.push_str(value);
            rest = &after[end + 1..];
        }
        dsn.push_str(rest);
        Ok(dsn)
    }

    fn placeholder(&self, name: &str) -> Option<&str> {
        match name {
            "username" => self.username.as_deref().or_else(|| self.get_string(name)),
            "password" => self.password.as_deref().or_else(|| self.get_string(name)),
            _ => self.get_string(name),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.driver_name.trim().is_empty() {
            return Err(Error::Config("driverName must not be empty".into()));
        }
        Ok(())
    }
}

/// Accept any JSON scalar as a parameter value.
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}
