//! Store configuration module.
//!
//! This module provides configuration loading for the blobtree store from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `BLOBTREE_BASE_PATH`: Base path of the store; the files are `<base>.idx`
//!   and `<base>.dat` (default: `./data/store`)
//! - `BLOBTREE_CACHE_PAGES`: Node cache capacity in pages (default: `1953`)
//!
//! # Invariants
//!
//! - `cache_pages` is always at least 1

use std::num::NonZeroUsize;
use std::path::PathBuf;

use crate::storage::PAGE_SIZE;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base path of the store. The index lives at `<base>.idx` and the values
    /// at `<base>.dat`.
    pub base_path: PathBuf,
    /// Number of decoded pages the node cache may hold.
    pub cache_pages: NonZeroUsize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl StoreConfig {
    /// Default base path.
    pub const DEFAULT_BASE_PATH: &'static str = "./data/store";
    /// Default cache capacity: about 2MB worth of page slots.
    pub const DEFAULT_CACHE_PAGES: usize = 2_000_000 / PAGE_SIZE;

    const BASE_PATH_VAR: &'static str = "BLOBTREE_BASE_PATH";
    const CACHE_PAGES_VAR: &'static str = "BLOBTREE_CACHE_PAGES";

    /// Configuration for a store at `base_path` with the default cache size.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            cache_pages: Self::default_cache_pages(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `BLOBTREE_CACHE_PAGES` is set but is not a positive
    /// integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_path = lookup(Self::BASE_PATH_VAR)
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(Self::DEFAULT_BASE_PATH), PathBuf::from);

        let cache_pages = match lookup(Self::CACHE_PAGES_VAR) {
            Some(value) => Self::parse_cache_pages(&value)?,
            None => Self::default_cache_pages(),
        };

        Ok(Self {
            base_path,
            cache_pages,
        })
    }

    fn parse_cache_pages(value: &str) -> Result<NonZeroUsize, ConfigError> {
        value
            .trim()
            .parse::<NonZeroUsize>()
            .map_err(|_| ConfigError::InvalidValue {
                name: Self::CACHE_PAGES_VAR.to_string(),
                message: format!("'{value}' is not a positive page count"),
            })
    }

    const fn default_cache_pages() -> NonZeroUsize {
        match NonZeroUsize::new(Self::DEFAULT_CACHE_PAGES) {
            Some(n) => n,
            None => NonZeroUsize::MIN,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_PATH)
    }
}
