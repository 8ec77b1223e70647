//! Central registry of named limiters and breakers.
//!
//! The registry owns every named config together with the runtime state
//! derived from it. Limiter entries are created per identifier on first
//! evaluation; a breaker instance is created on first use of its name.
//! Lookups clone an `Arc` out of the name map and release the map before
//! evaluating, so steady-state traffic never holds the top-level lock.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::error::{ExecuteError, GovernorError};
use crate::application::limiter::{LimiterEntry, RateLimiter};
use crate::application::metrics::{GovernorMetrics, Metrics};
use crate::application::ports::Clock;
use crate::domain::config::{BreakerConfig, ConfigError, GovernorConfig, LimiterConfig};
use crate::domain::decision::EvaluationResult;
use crate::domain::fallback::CallOutcome;
use crate::domain::state::CircuitState;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::eviction::LruEviction;
use crate::infrastructure::storage::ShardedStorage;
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Default cap on tracked identifiers per limiter.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Returned by [`GovernorRegistry::create_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigHandle {
    name: String,
    kind: &'static str,
    replaced: bool,
}

impl ConfigHandle {
    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"limiter"` or `"breaker"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Whether an existing config was replaced.
    pub fn replaced(&self) -> bool {
        self.replaced
    }
}

struct BreakerSlot {
    config: BreakerConfig,
    instance: OnceLock<Arc<CircuitBreaker>>,
}

#[derive(Clone)]
enum Registered {
    Limiter(Arc<RateLimiter>),
    Breaker(Arc<BreakerSlot>),
}

impl Registered {
    fn kind_name(&self) -> &'static str {
        match self {
            Registered::Limiter(_) => "limiter",
            Registered::Breaker(_) => "breaker",
        }
    }
}

struct RegistryInner {
    entries: DashMap<String, Registered, RandomState>,
    metrics: DashMap<String, Metrics, RandomState>,
    clock: Arc<dyn Clock>,
    max_entries: Option<usize>,
    idle_ttl: Option<Duration>,
}

/// Owns named governor configs and their runtime state.
///
/// Cheap to clone; clones share state. Create one per application and pass
/// it to whatever needs it.
///
/// # Examples
///
/// ```
/// use traffic_governor::{AlgorithmConfig, GovernorRegistry, LimiterConfig};
///
/// let registry = GovernorRegistry::new();
/// let config = LimiterConfig::new("api", AlgorithmConfig::token_bucket(2, 1.0).unwrap()).unwrap();
/// registry.create_config(config);
///
/// assert!(registry.evaluate("api", "alice").unwrap().is_allowed());
/// assert!(registry.evaluate("api", "alice").unwrap().is_allowed());
/// assert!(!registry.evaluate("api", "alice").unwrap().is_allowed());
/// ```
#[derive(Clone)]
pub struct GovernorRegistry {
    inner: Arc<RegistryInner>,
}

impl GovernorRegistry {
    /// Create a registry on the system clock with default bounds.
    pub fn new() -> Self {
        Self::from_builder(GovernorRegistryBuilder::default())
    }

    /// Create a builder for configuring the registry.
    pub fn builder() -> GovernorRegistryBuilder {
        GovernorRegistryBuilder::default()
    }

    fn from_builder(builder: GovernorRegistryBuilder) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::with_hasher(RandomState::new()),
                metrics: DashMap::with_hasher(RandomState::new()),
                clock: builder
                    .clock
                    .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>),
                max_entries: builder.max_entries,
                idle_ttl: builder.idle_ttl,
            }),
        }
    }

    /// Register a config, replacing any config with the same name.
    ///
    /// Replacement discards the runtime state of the old config. Metric
    /// counters for the name are kept.
    pub fn create_config(&self, config: impl Into<GovernorConfig>) -> ConfigHandle {
        let config = config.into();
        let name = config.name().to_owned();
        let kind = config.kind_name();
        let metrics = self
            .inner
            .metrics
            .entry(name.clone())
            .or_insert_with(|| Metrics::new(name.as_str()))
            .clone();

        let registered = match config {
            GovernorConfig::Limiter(config) => {
                Registered::Limiter(Arc::new(self.build_limiter(config, metrics)))
            }
            GovernorConfig::Breaker(config) => Registered::Breaker(Arc::new(BreakerSlot {
                config,
                instance: OnceLock::new(),
            })),
        };

        let replaced = self.inner.entries.insert(name.clone(), registered).is_some();
        if replaced {
            tracing::info!(config = %name, kind, "config replaced");
        } else {
            tracing::debug!(config = %name, kind, "config created");
        }

        ConfigHandle {
            name,
            kind,
            replaced,
        }
    }

    fn build_limiter(&self, config: LimiterConfig, metrics: Metrics) -> RateLimiter {
        let mut storage = ShardedStorage::new().with_metrics(metrics.clone());
        if let Some(max_entries) = self.inner.max_entries {
            storage = storage.with_eviction_policy(Arc::new(LruEviction::new(max_entries)));
        }
        RateLimiter::new(config, storage, Arc::clone(&self.inner.clock), metrics)
    }

    /// Remove a config and all state derived from it, metrics included.
    ///
    /// Returns `false` if nothing was registered under `name`.
    pub fn remove_config(&self, name: &str) -> bool {
        let removed = self.inner.entries.remove(name).is_some();
        if removed {
            self.inner.metrics.remove(name);
            tracing::info!(config = %name, "config removed");
        }
        removed
    }

    fn lookup(&self, name: &str) -> Result<Registered, GovernorError> {
        self.inner
            .entries
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GovernorError::ConfigNotFound(name.to_owned()))
    }

    fn limiter(&self, name: &str) -> Result<Arc<RateLimiter>, GovernorError> {
        match self.lookup(name)? {
            Registered::Limiter(limiter) => Ok(limiter),
            other => Err(GovernorError::KindMismatch {
                name: name.to_owned(),
                expected: "limiter",
                actual: other.kind_name(),
            }),
        }
    }

    /// Get the breaker registered under `name`, creating its instance on
    /// first use.
    ///
    /// # Errors
    /// Returns [`GovernorError::ConfigNotFound`] or
    /// [`GovernorError::KindMismatch`] for a limiter name.
    pub fn breaker(&self, name: &str) -> Result<Arc<CircuitBreaker>, GovernorError> {
        match self.lookup(name)? {
            Registered::Breaker(slot) => Ok(Arc::clone(slot.instance.get_or_init(|| {
                let metrics = self.metrics_handle(name);
                metrics.record_state(CircuitState::Closed);
                Arc::new(
                    CircuitBreaker::with_clock(slot.config.clone(), Arc::clone(&self.inner.clock))
                        .with_metrics(metrics),
                )
            }))),
            other => Err(GovernorError::KindMismatch {
                name: name.to_owned(),
                expected: "breaker",
                actual: other.kind_name(),
            }),
        }
    }

    fn metrics_handle(&self, name: &str) -> Metrics {
        self.inner
            .metrics
            .entry(name.to_owned())
            .or_insert_with(|| Metrics::new(name))
            .clone()
    }

    /// Get a copy of the limiter entry for `identifier`, creating it if
    /// necessary.
    ///
    /// # Errors
    /// Returns [`GovernorError::ConfigNotFound`] or
    /// [`GovernorError::KindMismatch`] for a breaker name.
    pub fn get_or_create_entry(
        &self,
        name: &str,
        identifier: &str,
    ) -> Result<LimiterEntry, GovernorError> {
        Ok(self.limiter(name)?.get_or_create_entry(identifier))
    }

    /// Decide whether one call from `identifier` may proceed under the
    /// limiter `name`.
    ///
    /// A denial is a normal result, not an error.
    ///
    /// # Errors
    /// Returns [`GovernorError::ConfigNotFound`] or
    /// [`GovernorError::KindMismatch`] for a breaker name.
    pub fn evaluate(&self, name: &str, identifier: &str) -> Result<EvaluationResult, GovernorError> {
        Ok(self.limiter(name)?.evaluate(identifier))
    }

    /// Run `operation` through the breaker `name`.
    ///
    /// # Errors
    /// Lookup failures surface as [`ExecuteError::Governor`]; otherwise see
    /// [`CircuitBreaker::execute`].
    pub fn execute<T, E, F>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<CallOutcome<T, E>, ExecuteError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
    {
        self.breaker(name)?.execute(operation)
    }

    /// Run a future through the breaker `name`.
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute).
    pub async fn execute_async<T, E, Fut>(
        &self,
        name: &str,
        operation: Fut,
    ) -> Result<CallOutcome<T, E>, ExecuteError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
    {
        let breaker = self.breaker(name)?;
        breaker.execute_async(operation).await
    }

    /// Open the breaker `name` now.
    ///
    /// # Errors
    /// Returns [`GovernorError::ConfigNotFound`] or
    /// [`GovernorError::KindMismatch`] for a limiter name.
    pub fn force_open(&self, name: &str) -> Result<(), GovernorError> {
        self.breaker(name)?.force_open();
        Ok(())
    }

    /// Close the breaker `name` now.
    ///
    /// # Errors
    /// Returns [`GovernorError::ConfigNotFound`] or
    /// [`GovernorError::KindMismatch`] for a limiter name.
    pub fn force_close(&self, name: &str) -> Result<(), GovernorError> {
        self.breaker(name)?.force_close();
        Ok(())
    }

    /// Reset runtime state under `name`.
    ///
    /// For a limiter, clears one identifier or, with `None`, every
    /// identifier. Breakers are not keyed by identifier, so the whole
    /// breaker is reset and `identifier` is ignored.
    ///
    /// # Errors
    /// Returns [`GovernorError::ConfigNotFound`] for an unknown name.
    pub fn reset(&self, name: &str, identifier: Option<&str>) -> Result<(), GovernorError> {
        match self.lookup(name)? {
            Registered::Limiter(limiter) => limiter.reset(identifier),
            Registered::Breaker(slot) => {
                if let Some(breaker) = slot.instance.get() {
                    breaker.reset();
                }
            }
        }
        Ok(())
    }

    /// Aggregated metrics for `name`.
    ///
    /// Breakers also report their current rates and state. A breaker that
    /// has not run yet reports CLOSED with zero rates and is not created.
    ///
    /// # Errors
    /// Returns [`GovernorError::ConfigNotFound`] for an unknown name.
    pub fn metrics(&self, name: &str) -> Result<GovernorMetrics, GovernorError> {
        let registered = self.lookup(name)?;
        let snapshot = self.metrics_handle(name).snapshot();
        let mut metrics = GovernorMetrics::from_snapshot(name, snapshot);
        if let Registered::Breaker(slot) = registered {
            let (failure_rate, slow_call_rate, state) = match slot.instance.get() {
                Some(breaker) => {
                    let snapshot = breaker.snapshot();
                    (snapshot.failure_rate, snapshot.slow_call_rate, snapshot.state)
                }
                None => (0.0, 0.0, CircuitState::Closed),
            };
            metrics.failure_rate = Some(failure_rate);
            metrics.slow_call_rate = Some(slow_call_rate);
            metrics.state = Some(state);
        }
        Ok(metrics)
    }

    /// The config registered under `name`.
    pub fn config(&self, name: &str) -> Option<GovernorConfig> {
        self.lookup(name).ok().map(|registered| match registered {
            Registered::Limiter(limiter) => GovernorConfig::Limiter(limiter.config().clone()),
            Registered::Breaker(slot) => GovernorConfig::Breaker(slot.config.clone()),
        })
    }

    /// Registered names, sorted.
    pub fn config_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of identifiers tracked by the limiter `name`.
    ///
    /// # Errors
    /// Returns [`GovernorError::ConfigNotFound`] or
    /// [`GovernorError::KindMismatch`] for a breaker name.
    pub fn entry_count(&self, name: &str) -> Result<usize, GovernorError> {
        Ok(self.limiter(name)?.len())
    }

    /// Drop limiter entries not evaluated within `max_idle`, across every
    /// limiter. Returns how many were dropped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let limiters: Vec<Arc<RateLimiter>> = self
            .inner
            .entries
            .iter()
            .filter_map(|entry| match entry.value() {
                Registered::Limiter(limiter) => Some(Arc::clone(limiter)),
                Registered::Breaker(_) => None,
            })
            .collect();
        limiters
            .iter()
            .map(|limiter| limiter.sweep_idle(max_idle))
            .sum()
    }

    /// Sweep with the configured idle TTL. Returns 0 when none is set.
    pub fn sweep_expired(&self) -> usize {
        self.inner
            .idle_ttl
            .map_or(0, |ttl| self.sweep_idle(ttl))
    }

    /// Configured idle TTL.
    pub fn idle_ttl(&self) -> Option<Duration> {
        self.inner.idle_ttl
    }

    /// Configured per-limiter entry cap.
    pub fn max_entries(&self) -> Option<usize> {
        self.inner.max_entries
    }
}

impl Default for GovernorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GovernorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernorRegistry")
            .field("configs", &self.inner.entries.len())
            .field("max_entries", &self.inner.max_entries)
            .field("idle_ttl", &self.inner.idle_ttl)
            .finish()
    }
}

/// Builder for [`GovernorRegistry`].
pub struct GovernorRegistryBuilder {
    clock: Option<Arc<dyn Clock>>,
    max_entries: Option<usize>,
    idle_ttl: Option<Duration>,
}

impl Default for GovernorRegistryBuilder {
    fn default() -> Self {
        Self {
            clock: None,
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            idle_ttl: None,
        }
    }
}

impl GovernorRegistryBuilder {
    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Cap tracked identifiers per limiter, evicting the least recently
    /// used when full.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Track any number of identifiers per limiter.
    pub fn unlimited_entries(mut self) -> Self {
        self.max_entries = None;
        self
    }

    /// Idle time after which [`GovernorRegistry::sweep_expired`] drops an
    /// entry.
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    /// Build the registry.
    ///
    /// # Errors
    /// Returns an error if the entry cap or idle TTL is zero.
    pub fn build(self) -> Result<GovernorRegistry, ConfigError> {
        if self.max_entries == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.idle_ttl == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroDuration("idle_ttl"));
        }
        Ok(GovernorRegistry::from_builder(self))
    }
}

impl fmt::Debug for GovernorRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernorRegistryBuilder")
            .field("custom_clock", &self.clock.is_some())
            .field("max_entries", &self.max_entries)
            .field("idle_ttl", &self.idle_ttl)
            .finish()
    }
}
