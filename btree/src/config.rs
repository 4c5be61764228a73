//! Tree configuration.
//!
//! The only tunable of a tree is its minimum degree `t`, fixed when the tree
//! is created. It can be given explicitly or loaded from the environment.
//!
//! # Environment Variables
//!
//! - `COUNTED_BTREE_MINIMUM_DEGREE`: minimum degree of newly created trees
//!   (default: `16`, must be at least `2`)
//!
//! # Invariants
//!
//! - `minimum_degree` is always at least [`TreeConfig::MIN_DEGREE`]

/// Configuration used when creating a tree.
///
/// # Post-conditions
///
/// - Non-root nodes of a tree created from this config hold between
///   `minimum_degree - 1` and `2 * minimum_degree - 1` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Minimum degree `t` of the tree.
    pub minimum_degree: usize,
}

/// Error returned when a configuration value is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The minimum degree is below [`TreeConfig::MIN_DEGREE`].
    InvalidDegree(usize),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDegree(degree) => write!(
                f,
                "minimum degree must be {} or greater, got {degree}",
                TreeConfig::MIN_DEGREE
            ),
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl TreeConfig {
    /// Smallest degree for which B-tree splitting and merging are defined.
    pub const MIN_DEGREE: usize = 2;
    /// Degree used when the environment does not specify one.
    pub const DEFAULT_MINIMUM_DEGREE: usize = 16;
    /// Environment variable holding the default minimum degree.
    pub const DEGREE_ENV_VAR: &'static str = "COUNTED_BTREE_MINIMUM_DEGREE";

    /// Create a validated configuration.
    pub fn new(minimum_degree: usize) -> Result<Self, ConfigError> {
        if minimum_degree < Self::MIN_DEGREE {
            return Err(ConfigError::InvalidDegree(minimum_degree));
        }
        Ok(Self { minimum_degree })
    }

    /// Load the configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `COUNTED_BTREE_MINIMUM_DEGREE` is set but is not a
    /// number, or is smaller than [`TreeConfig::MIN_DEGREE`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_value(std::env::var(Self::DEGREE_ENV_VAR).ok().as_deref())
    }

    /// Parse the degree from an optional raw value.
    fn from_value(raw: Option<&str>) -> Result<Self, ConfigError> {
        let Some(raw) = raw else {
            return Ok(Self::default());
        };

        let degree = raw
            .trim()
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue {
                name: Self::DEGREE_ENV_VAR.to_string(),
                message: format!("'{raw}' is not a valid degree: {e}"),
            })?;

        Self::new(degree).map_err(|e| ConfigError::InvalidValue {
            name: Self::DEGREE_ENV_VAR.to_string(),
            message: e.to_string(),
        })
    }

    /// Maximum number of keys a node may hold.
    #[must_use]
    pub const fn max_keys(&self) -> usize {
        2 * self.minimum_degree - 1
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            minimum_degree: Self::DEFAULT_MINIMUM_DEGREE,
        }
    }
}
