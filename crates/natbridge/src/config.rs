//! Bridge configuration.

use natbridge_log::Level;

/// Environment variable holding the log level.
pub const LOG_ENV_VAR: &str = natbridge_log::DEFAULT_ENV_VAR;

/// Environment variable holding the live object limit.
pub const MAX_OBJECTS_ENV_VAR: &str = "NATBRIDGE_MAX_OBJECTS";

/// How numeric arguments to variadic native methods are passed when the
/// managed caller supplies boxed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum VariadicUnboxPolicy {
    /// Pass boxed numbers as objects.
    Boxed = 0,
    /// Unbox numbers to their primitive kind.
    #[default]
    Unboxed = 1,
}

impl VariadicUnboxPolicy {
    /// Returns the wire value of the policy.
    #[must_use]
    pub const fn as_i8(self) -> i8 {
        self as i8
    }
}

/// Configuration for a [`Bridge`](crate::Bridge).
///
/// # Example
///
/// ```
/// use natbridge::BridgeConfig;
/// use natbridge_log::Level;
///
/// let config = BridgeConfig::default()
///     .with_log_level(Level::Debug)
///     .with_max_live_objects(Some(10_000));
/// assert_eq!(config.max_live_objects, Some(10_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Level applied to the global logger by [`api::initialize`](crate::api::initialize).
    /// `None` leaves the logger untouched.
    pub log_level: Option<Level>,
    /// Upper bound on live native objects. `None` is unbounded.
    pub max_live_objects: Option<usize>,
    /// Log a warning when an object is autoreleased with no pool open.
    pub warn_on_poolless_autorelease: bool,
    /// Returned by `default_variadic_unbox_policy`.
    pub variadic_unbox_policy: VariadicUnboxPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            log_level: None,
            max_live_objects: None,
            warn_on_poolless_autorelease: true,
            variadic_unbox_policy: VariadicUnboxPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Unset variables keep their defaults. Malformed values are ignored with
    /// a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = BridgeConfig::default();

        if let Some(value) = lookup(LOG_ENV_VAR) {
            match value.parse::<Level>() {
                Ok(level) => config.log_level = Some(level),
                Err(err) => natbridge_log::warn!("ignoring {LOG_ENV_VAR}: {err}"),
            }
        }

        if let Some(value) = lookup(MAX_OBJECTS_ENV_VAR) {
            match value.trim().parse::<usize>() {
                Ok(limit) => config.max_live_objects = Some(limit),
                Err(err) => {
                    natbridge_log::warn!("ignoring {MAX_OBJECTS_ENV_VAR}={value:?}: {err}");
                }
            }
        }

        config
    }

    /// Sets the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Sets the live object limit.
    #[must_use]
    pub fn with_max_live_objects(mut self, limit: Option<usize>) -> Self {
        self.max_live_objects = limit;
        self
    }

    /// Enables or disables the pool-less autorelease warning.
    #[must_use]
    pub fn with_poolless_autorelease_warning(mut self, warn: bool) -> Self {
        self.warn_on_poolless_autorelease = warn;
        self
    }

    /// Sets the variadic unbox policy.
    #[must_use]
    pub fn with_variadic_unbox_policy(mut self, policy: VariadicUnboxPolicy) -> Self {
        self.variadic_unbox_policy = policy;
        self
    }
}
