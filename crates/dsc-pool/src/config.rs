//! Checkout-time pool tuning.

use std::time::Duration;

use dsc_core::{Config, NativeDatabase};

/// Parameter key for the native handle's maximum link lifetime, in milliseconds.
pub const CONN_MAX_LIFETIME_MS_KEY: &str = "connMaxLifetimeMs";

/// Lifetime used when [`CONN_MAX_LIFETIME_MS_KEY`] is present but not a number.
pub const DEFAULT_CONN_MAX_LIFETIME_MS: u32 = 1000;

/// Parameter key for the native handle's maximum idle links.
pub const MAX_IDLE_CONNS_KEY: &str = "maxIdleConns";

/// Idle link count used when [`MAX_IDLE_CONNS_KEY`] is present but not a number.
pub const DEFAULT_MAX_IDLE_CONNS: i64 = 1;

/// Idle time after which a pooled connection is pinged before reuse.
pub const STALE_AFTER: Duration = Duration::from_secs(60);

/// Native handle settings applied when a pooled connection is checked out.
///
/// Each setting is only present when its key appears in the config
/// parameters; a zero lifetime is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolTuning {
    /// Value for [`NativeDatabase::set_conn_max_lifetime`].
    pub conn_max_lifetime: Option<Duration>,
    /// Value for [`NativeDatabase::set_max_idle_conns`].
    pub max_idle_conns: Option<usize>,
}

impl PoolTuning {
    /// Read the tuning keys from a config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let conn_max_lifetime = config
            .has(CONN_MAX_LIFETIME_MS_KEY)
            .then(|| {
                config.get_duration(
                    CONN_MAX_LIFETIME_MS_KEY,
                    Duration::from_millis(1),
                    DEFAULT_CONN_MAX_LIFETIME_MS,
                )
            })
            .filter(|lifetime| !lifetime.is_zero());

        let max_idle_conns = config.has(MAX_IDLE_CONNS_KEY).then(|| {
            let count = config.get_int(MAX_IDLE_CONNS_KEY, DEFAULT_MAX_IDLE_CONNS);
            usize::try_from(count).unwrap_or(0)
        });

        Self {
            conn_max_lifetime,
            max_idle_conns,
        }
    }

    /// Check if no setting is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conn_max_lifetime.is_none() && self.max_idle_conns.is_none()
    }

    /// Apply the configured settings to a native handle.
    pub fn apply(&self, db: &dyn NativeDatabase) {
        if let Some(lifetime) = self.conn_max_lifetime {
            db.set_conn_max_lifetime(lifetime);
        }
        if let Some(count) = self.max_idle_conns {
            db.set_max_idle_conns(count);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keys() {
        let tuning = PoolTuning::from_config(&Config::new("pg", ""));
        assert!(tuning.is_empty());
    }

    #[test]
    fn test_both_keys() {
        let config = Config::new("pg", "")
            .parameter(CONN_MAX_LIFETIME_MS_KEY, 2500)
            .parameter(MAX_IDLE_CONNS_KEY, 4);
        let tuning = PoolTuning::from_config(&config);

        assert_eq!(tuning.conn_max_lifetime, Some(Duration::from_millis(2500)));
        assert_eq!(tuning.max_idle_conns, Some(4));
    }

    #[test]
    fn test_invalid_values_use_defaults() {
        let config = Config::new("pg", "")
            .parameter(CONN_MAX_LIFETIME_MS_KEY, "soon")
            .parameter(MAX_IDLE_CONNS_KEY, "many");
        let tuning = PoolTuning::from_config(&config);

        assert_eq!(tuning.conn_max_lifetime, Some(Duration::from_secs(1)));
        assert_eq!(tuning.max_idle_conns, Some(1));
    }

    #[test]
    fn test_zero_lifetime_ignored() {
        let config = Config::new("pg", "").parameter(CONN_MAX_LIFETIME_MS_KEY, 0);
        let tuning = PoolTuning::from_config(&config);

        assert_eq!(tuning.conn_max_lifetime, None);
        assert!(tuning.is_empty());
    }

    #[test]
    fn test_negative_idle_clamped() {
        let config = Config::new("pg", "").parameter(MAX_IDLE_CONNS_KEY, -3);
        let tuning = PoolTuning::from_config(&config);

        assert_eq!(tuning.max_idle_conns, Some(0));
    }
}
