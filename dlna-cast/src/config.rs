//! Configuration for casting sessions
//!
//! `CastConfig` controls subscription leases, renewal timing, HTTP timeouts
//! and the callback server's port range.

use std::time::Duration;

use crate::error::{CastError, Result};

/// Configuration for a [`CastSession`](crate::CastSession)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastConfig {
    /// Lease requested in the SUBSCRIBE `TIMEOUT` header
    /// Default: 300 seconds
    pub subscription_timeout: Duration,

    /// Lease assumed when the renderer does not advertise one
    /// Default: 300 seconds
    pub fallback_timeout: Duration,

    /// Renewal fires after `lease / renewal_divisor` for long leases
    /// Default: 5
    pub renewal_divisor: u32,

    /// Leases at or below this length use `short_lease_renewal` instead
    /// Default: 20 seconds
    pub short_lease_threshold: Duration,

    /// Fixed renewal delay for short leases
    /// Default: 5 seconds
    pub short_lease_renewal: Duration,

    /// TCP connect timeout for every renderer request
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Read timeout for every renderer request
    /// Default: 10 seconds
    pub read_timeout: Duration,

    /// Port range for the callback server
    /// Default: (3500, 3600)
    pub callback_port_range: (u16, u16),

    /// Step used by interactive volume up/down
    /// Default: 1
    pub volume_step: u8,

    /// Capacity of the renderer event broadcast channel
    /// Default: 64
    pub event_buffer_size: usize,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            subscription_timeout: Duration::from_secs(300),
            fallback_timeout: Duration::from_secs(300),
            renewal_divisor: 5,
            short_lease_threshold: Duration::from_secs(20),
            short_lease_renewal: Duration::from_secs(5),
            connect_timeout: soap_client::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: soap_client::DEFAULT_READ_TIMEOUT,
            callback_port_range: (3500, 3600),
            volume_step: 1,
            event_buffer_size: 64,
        }
    }
}

impl CastConfig {
    /// Create a CastConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for renderers on slow or lossy links
    pub fn patient() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Config requesting short leases that are renewed often
    pub fn short_leases() -> Self {
        Self {
            subscription_timeout: Duration::from_secs(60),
            fallback_timeout: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.callback_port_range.0 > self.callback_port_range.1 {
            return Err(CastError::Configuration(
                "Invalid callback port range: start must not exceed end".to_string(),
            ));
        }

        if self.subscription_timeout.as_secs() == 0 {
            return Err(CastError::Configuration(
                "Subscription timeout must be at least one second".to_string(),
            ));
        }

        if self.fallback_timeout.as_secs() == 0 {
            return Err(CastError::Configuration(
                "Fallback timeout must be at least one second".to_string(),
            ));
        }

        if self.renewal_divisor == 0 {
            return Err(CastError::Configuration(
                "Renewal divisor must be greater than 0".to_string(),
            ));
        }

        if self.short_lease_renewal.is_zero() {
            return Err(CastError::Configuration(
                "Short lease renewal delay must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(CastError::Configuration(
                "HTTP timeouts must be greater than 0".to_string(),
            ));
        }

        if self.volume_step == 0 || self.volume_step > 100 {
            return Err(CastError::Configuration(
                "Volume step must be within 1..=100".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(CastError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Lease requested in SUBSCRIBE, in whole seconds
    pub fn requested_timeout_secs(&self) -> u32 {
        u32::try_from(self.subscription_timeout.as_secs()).unwrap_or(u32::MAX)
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    pub fn with_renewal_divisor(mut self, divisor: u32) -> Self {
        self.renewal_divisor = divisor;
        self
    }

    pub fn with_short_lease(mut self, threshold: Duration, renewal: Duration) -> Self {
        self.short_lease_threshold = threshold;
        self.short_lease_renewal = renewal;
        self
    }

    pub fn with_http_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_callback_ports(mut self, start: u16, end: u16) -> Self {
        self.callback_port_range = (start, end);
        self
    }

    pub fn with_volume_step(mut self, step: u8) -> Self {
        self.volume_step = step;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CastConfig::default();
        assert_eq!(config.subscription_timeout, Duration::from_secs(300));
        assert_eq!(config.fallback_timeout, Duration::from_secs(300));
        assert_eq!(config.renewal_divisor, 5);
        assert_eq!(config.short_lease_threshold, Duration::from_secs(20));
        assert_eq!(config.short_lease_renewal, Duration::from_secs(5));
        assert_eq!(config.callback_port_range, (3500, 3600));
        assert_eq!(config.volume_step, 1);
        assert_eq!(config.requested_timeout_secs(), 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(CastConfig::patient().validate().is_ok());
        assert!(CastConfig::short_leases().validate().is_ok());
        assert_eq!(CastConfig::short_leases().requested_timeout_secs(), 60);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(CastConfig::default()
            .with_callback_ports(4000, 3000)
            .validate()
            .is_err());
        assert!(CastConfig::default()
            .with_renewal_divisor(0)
            .validate()
            .is_err());
        assert!(CastConfig::default()
            .with_subscription_timeout(Duration::from_millis(500))
            .validate()
            .is_err());
        assert!(CastConfig::default()
            .with_volume_step(0)
            .validate()
            .is_err());
        assert!(CastConfig::default()
            .with_event_buffer_size(0)
            .validate()
            .is_err());
        assert!(CastConfig::default()
            .with_short_lease(Duration::from_secs(20), Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = CastConfig::new()
            .with_callback_ports(4000, 4010)
            .with_volume_step(5)
            .with_http_timeouts(Duration::from_secs(1), Duration::from_secs(2));

        assert_eq!(config.callback_port_range, (4000, 4010));
        assert_eq!(config.volume_step, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
    }
}
