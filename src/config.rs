use crate::error::{Error, Result};
use std::time::Duration;

/// Runtime configuration for the session tracking engine and the quota
/// rollup job.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// How often the rollup job recomputes quota statistics.
    pub rollup_interval: Duration,
    /// Sessions whose last event is older than this are eligible for expiry.
    pub session_ttl: Duration,
    /// Whether prometheus metrics are recorded.
    pub metrics_enabled: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            rollup_interval: Duration::from_secs(30),
            session_ttl: Duration::from_secs(300),
            metrics_enabled: true,
        }
    }
}

impl QuotaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rollup_interval.is_zero() {
            return Err(Error::Config("rollup_interval must be non-zero".into()));
        }
        if self.session_ttl.is_zero() {
            return Err(Error::Config("session_ttl must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(QuotaConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = QuotaConfig {
            rollup_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
