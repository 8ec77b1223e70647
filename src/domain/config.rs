//! Named governor configurations.
//!
//! A [`GovernorConfig`] is immutable once built. Updating a policy means
//! registering a replacement under the same name.

use crate::domain::algorithm::{AlgorithmConfig, AlgorithmKind};
use crate::domain::fallback::{FallbackStrategy, FallbackValue};
use crate::domain::window::WindowType;
use std::any::Any;
use std::fmt;
use std::time::Duration;

/// Errors that can occur when building a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Bucket capacity must be at least one
    #[error("capacity must be greater than 0")]
    ZeroCapacity,
    /// Refill or leak rate must be a positive finite number
    #[error("rate must be a positive finite number, got {0}")]
    InvalidRate(f64),
    /// Window limit must be at least one
    #[error("limit must be greater than 0")]
    ZeroLimit,
    /// Window duration must be non-zero
    #[error("window duration must be greater than 0")]
    ZeroWindow,
    /// Percentage thresholds live in (0, 100]
    #[error("{name} must be in (0, 100], got {value}")]
    InvalidThreshold {
        /// Which threshold
        name: &'static str,
        /// The rejected value
        value: f64,
    },
    /// Half-open state must admit at least one trial call
    #[error("permitted calls in half-open state must be greater than 0")]
    ZeroHalfOpenCalls,
    /// `ReturnDefault` needs a value to return
    #[error("fallback strategy ReturnDefault requires a fallback value")]
    MissingFallbackValue,
    /// Config names are used as registry keys and metric labels
    #[error("config name must not be empty")]
    EmptyName,
    /// The breaker window must be able to hold a call
    #[error("breaker window must hold at least one call")]
    EmptyWindow,
    /// A count window must be able to hold `minimum_calls` records
    #[error("minimum_calls ({minimum_calls}) exceeds the count window size ({window})")]
    MinimumCallsExceedWindow {
        /// Configured minimum
        minimum_calls: u64,
        /// Configured window size
        window: usize,
    },
    /// An interval or TTL must be non-zero
    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),
}

/// How a limiter keys its per-identifier entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LimitScope {
    /// One entry shared by every caller
    Global,
    /// One entry per user
    #[default]
    User,
    /// One entry per client address
    Ip,
    /// One entry per API key
    ApiKey,
    /// One entry per endpoint
    Endpoint,
    /// One entry per tenant
    Tenant,
}

impl LimitScope {
    /// Storage key for `identifier` under this scope.
    pub fn key(&self, identifier: &str) -> String {
        match self {
            LimitScope::Global => String::from("*"),
            _ => identifier.to_owned(),
        }
    }
}

/// Configuration of one named rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    name: String,
    algorithm: AlgorithmConfig,
    scope: LimitScope,
}

impl LimiterConfig {
    /// Create a limiter config keyed per identifier.
    ///
    /// # Errors
    /// Returns an error if `name` is empty.
    pub fn new(name: impl Into<String>, algorithm: AlgorithmConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(Self {
            name,
            algorithm,
            scope: LimitScope::default(),
        })
    }

    /// Set the keying scope.
    pub fn with_scope(mut self, scope: LimitScope) -> Self {
        self.scope = scope;
        self
    }

    /// Config name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Algorithm parameters.
    pub fn algorithm(&self) -> &AlgorithmConfig {
        &self.algorithm
    }

    /// Algorithm discriminant.
    pub fn kind(&self) -> AlgorithmKind {
        self.algorithm.kind()
    }

    /// Keying scope.
    pub fn scope(&self) -> LimitScope {
        self.scope
    }
}

/// Configuration of one named circuit breaker.
///
/// Build with [`BreakerConfig::builder`].
#[derive(Clone)]
pub struct BreakerConfig {
    name: String,
    failure_rate_threshold: f64,
    slow_call_rate_threshold: f64,
    slow_call_duration: Duration,
    window_type: WindowType,
    minimum_calls: u64,
    wait_duration: Duration,
    permitted_calls_in_half_open: u32,
    fallback: FallbackStrategy,
    fallback_value: Option<FallbackValue>,
}

impl BreakerConfig {
    /// Start building a breaker config with default thresholds.
    pub fn builder(name: impl Into<String>) -> BreakerConfigBuilder {
        BreakerConfigBuilder::new(name)
    }

    /// Config name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Failure percentage at which the breaker opens.
    pub fn failure_rate_threshold(&self) -> f64 {
        self.failure_rate_threshold
    }

    /// Slow-call percentage at which the breaker opens.
    pub fn slow_call_rate_threshold(&self) -> f64 {
        self.slow_call_rate_threshold
    }

    /// Calls longer than this are slow.
    pub fn slow_call_duration(&self) -> Duration {
        self.slow_call_duration
    }

    /// Window bounds.
    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    /// Calls needed in the window before rates are evaluated.
    pub fn minimum_calls(&self) -> u64 {
        self.minimum_calls
    }

    /// How long the breaker stays open.
    pub fn wait_duration(&self) -> Duration {
        self.wait_duration
    }

    /// Trial calls admitted while half-open.
    pub fn permitted_calls_in_half_open(&self) -> u32 {
        self.permitted_calls_in_half_open
    }

    /// What callers observe on rejection or failure.
    pub fn fallback(&self) -> FallbackStrategy {
        self.fallback
    }

    /// Value returned under [`FallbackStrategy::ReturnDefault`].
    pub fn fallback_value(&self) -> Option<&FallbackValue> {
        self.fallback_value.as_ref()
    }
}

impl fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("name", &self.name)
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field("slow_call_rate_threshold", &self.slow_call_rate_threshold)
            .field("slow_call_duration", &self.slow_call_duration)
            .field("window_type", &self.window_type)
            .field("minimum_calls", &self.minimum_calls)
            .field("wait_duration", &self.wait_duration)
            .field(
                "permitted_calls_in_half_open",
                &self.permitted_calls_in_half_open,
            )
            .field("fallback", &self.fallback)
            .field("fallback_value", &self.fallback_value)
            .finish()
    }
}

/// Builder for [`BreakerConfig`].
#[derive(Debug)]
pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl BreakerConfigBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            config: BreakerConfig {
                name: name.into(),
                failure_rate_threshold: 50.0,
                slow_call_rate_threshold: 100.0,
                slow_call_duration: Duration::from_secs(60),
                window_type: WindowType::CountBased(100),
                minimum_calls: 100,
                wait_duration: Duration::from_secs(60),
                permitted_calls_in_half_open: 10,
                fallback: FallbackStrategy::Throw,
                fallback_value: None,
            },
        }
    }

    /// Failure percentage in (0, 100] at which the breaker opens.
    pub fn failure_rate_threshold(mut self, percent: f64) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    /// Slow-call percentage in (0, 100] at which the breaker opens.
    pub fn slow_call_rate_threshold(mut self, percent: f64) -> Self {
        self.config.slow_call_rate_threshold = percent;
        self
    }

    /// Calls strictly longer than this count as slow.
    pub fn slow_call_duration(mut self, duration: Duration) -> Self {
        self.config.slow_call_duration = duration;
        self
    }

    /// Keep the last `size` calls.
    pub fn count_window(mut self, size: usize) -> Self {
        self.config.window_type = WindowType::CountBased(size);
        self
    }

    /// Keep calls from the last `span`.
    pub fn time_window(mut self, span: Duration) -> Self {
        self.config.window_type = WindowType::TimeBased(span);
        self
    }

    /// Calls needed in the window before the breaker may open.
    pub fn minimum_calls(mut self, calls: u64) -> Self {
        self.config.minimum_calls = calls;
        self
    }

    /// How long to stay open before admitting trial calls.
    pub fn wait_duration(mut self, duration: Duration) -> Self {
        self.config.wait_duration = duration;
        self
    }

    /// Trial calls admitted while half-open.
    pub fn permitted_calls_in_half_open(mut self, calls: u32) -> Self {
        self.config.permitted_calls_in_half_open = calls;
        self
    }

    /// What callers observe on rejection or failure.
    pub fn fallback(mut self, strategy: FallbackStrategy) -> Self {
        self.config.fallback = strategy;
        self
    }

    /// Value returned under [`FallbackStrategy::ReturnDefault`].
    ///
    /// The value must have the result type of the operations the breaker
    /// wraps; a mismatch surfaces as an error at call time.
    pub fn fallback_value<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.config.fallback_value = Some(FallbackValue::new(value));
        self
    }

    /// Validate and build the config.
    ///
    /// # Errors
    /// Returns an error if the name is empty or a threshold is outside
    /// (0, 100]. Also rejects an empty window, a count window smaller than
    /// `minimum_calls`, zero permitted half-open calls, and `ReturnDefault`
    /// without a fallback value.
    pub fn build(self) -> Result<BreakerConfig, ConfigError> {
        let config = self.config;
        if config.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        validate_threshold("failure_rate_threshold", config.failure_rate_threshold)?;
        validate_threshold("slow_call_rate_threshold", config.slow_call_rate_threshold)?;
        if config.window_type.is_empty_window() {
            return Err(ConfigError::EmptyWindow);
        }
        if let WindowType::CountBased(window) = config.window_type {
            if config.minimum_calls > window as u64 {
                return Err(ConfigError::MinimumCallsExceedWindow {
                    minimum_calls: config.minimum_calls,
                    window,
                });
            }
        }
        if config.permitted_calls_in_half_open == 0 {
            return Err(ConfigError::ZeroHalfOpenCalls);
        }
        if config.fallback == FallbackStrategy::ReturnDefault && config.fallback_value.is_none() {
            return Err(ConfigError::MissingFallbackValue);
        }
        Ok(config)
    }
}

fn validate_threshold(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

/// Policy for one named limiter or breaker.
#[derive(Debug, Clone)]
pub enum GovernorConfig {
    /// Admission control
    Limiter(LimiterConfig),
    /// Fault isolation
    Breaker(BreakerConfig),
}

impl GovernorConfig {
    /// Config name.
    pub fn name(&self) -> &str {
        match self {
            GovernorConfig::Limiter(c) => c.name(),
            GovernorConfig::Breaker(c) => c.name(),
        }
    }

    /// Human-readable kind, used in errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            GovernorConfig::Limiter(_) => "limiter",
            GovernorConfig::Breaker(_) => "breaker",
        }
    }
}

impl From<LimiterConfig> for GovernorConfig {
    fn from(config: LimiterConfig) -> Self {
        GovernorConfig::Limiter(config)
    }
}

impl From<BreakerConfig> for GovernorConfig {
    fn from(config: BreakerConfig) -> Self {
        GovernorConfig::Breaker(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_defaults() {
        let config = BreakerConfig::builder("payments").build().unwrap();
        assert_eq!(config.failure_rate_threshold(), 50.0);
        assert_eq!(config.slow_call_rate_threshold(), 100.0);
        assert_eq!(config.slow_call_duration(), Duration::from_secs(60));
        assert_eq!(config.window_type(), WindowType::CountBased(100));
        assert_eq!(config.minimum_calls(), 100);
        assert_eq!(config.wait_duration(), Duration::from_secs(60));
        assert_eq!(config.permitted_calls_in_half_open(), 10);
        assert_eq!(config.fallback(), FallbackStrategy::Throw);
        assert!(config.fallback_value().is_none());
    }

    #[test]
    fn test_breaker_validation() {
        let err = BreakerConfig::builder("")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptyName);

        let err = BreakerConfig::builder("b")
            .failure_rate_threshold(0.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold { name: "failure_rate_threshold", .. }));

        let err = BreakerConfig::builder("b")
            .slow_call_rate_threshold(100.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold { name: "slow_call_rate_threshold", .. }));

        let err = BreakerConfig::builder("b").count_window(0).build().unwrap_err();
        assert_eq!(err, ConfigError::EmptyWindow);

        let err = BreakerConfig::builder("b")
            .count_window(5)
            .minimum_calls(10)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MinimumCallsExceedWindow {
                minimum_calls: 10,
                window: 5
            }
        );
        assert!(BreakerConfig::builder("b")
            .count_window(5)
            .minimum_calls(5)
            .build()
            .is_ok());

        let err = BreakerConfig::builder("b")
            .permitted_calls_in_half_open(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroHalfOpenCalls);

        let err = BreakerConfig::builder("b")
            .fallback(FallbackStrategy::ReturnDefault)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingFallbackValue);

        assert!(BreakerConfig::builder("b")
            .fallback(FallbackStrategy::ReturnDefault)
            .fallback_value(0u32)
            .build()
            .is_ok());
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::InvalidThreshold {
            name: "failure_rate_threshold",
            value: 120.0,
        };
        assert_eq!(err.to_string(), "failure_rate_threshold must be in (0, 100], got 120");
        assert_eq!(
            ConfigError::InvalidRate(-1.0).to_string(),
            "rate must be a positive finite number, got -1"
        );
        assert_eq!(
            ConfigError::ZeroDuration("idle_ttl").to_string(),
            "idle_ttl must be greater than 0"
        );
    }

    #[test]
    fn test_scope_keys() {
        assert_eq!(LimitScope::Global.key("alice"), LimitScope::Global.key("bob"));
        assert_eq!(LimitScope::User.key("alice"), "alice");
        assert_ne!(LimitScope::Ip.key("10.0.0.1"), LimitScope::Ip.key("10.0.0.2"));
    }

    #[test]
    fn test_limiter_config() {
        let algorithm = AlgorithmConfig::token_bucket(10, 1.0).unwrap();
        let config = LimiterConfig::new("api", algorithm)
            .unwrap()
            .with_scope(LimitScope::ApiKey);
        assert_eq!(config.name(), "api");
        assert_eq!(config.kind(), AlgorithmKind::TokenBucket);
        assert_eq!(config.scope(), LimitScope::ApiKey);

        assert_eq!(
            LimiterConfig::new("", algorithm).unwrap_err(),
            ConfigError::EmptyName
        );
    }

    #[test]
    fn test_governor_config_name() {
        let limiter: GovernorConfig = LimiterConfig::new(
            "api",
            AlgorithmConfig::fixed_window_counter(1, Duration::from_secs(1)).unwrap(),
        )
        .unwrap()
        .into();
        let breaker: GovernorConfig = BreakerConfig::builder("db").build().unwrap().into();
        assert_eq!(limiter.name(), "api");
        assert_eq!(limiter.kind_name(), "limiter");
        assert_eq!(breaker.name(), "db");
        assert_eq!(breaker.kind_name(), "breaker");
    }
}
