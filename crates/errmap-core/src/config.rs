//! Mapper configuration
//!
//! Declarative settings applied on top of what the integrator registered in
//! code: schemes to disable and per-scheme option overrides. Loaded from
//! JSON or TOML and merged with the `ERRMAP_*` environment.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::scheme::SchemeOptions;

/// Environment variable listing disabled schemes, comma separated
pub const DISABLED_SCHEMES_ENV: &str = "ERRMAP_DISABLED_SCHEMES";

/// Overrides for one scheme's options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemeSettings {
    /// Override of [`SchemeOptions::accepts_return_values`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepts_return_values: Option<bool>,
    /// Override of [`SchemeOptions::implicit_mapping`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implicit_mapping: Option<bool>,
}

impl SchemeSettings {
    /// Write the overrides into `options`
    pub fn apply_to(&self, options: &mut SchemeOptions) {
        if let Some(accepts) = self.accepts_return_values {
            options.accepts_return_values = accepts;
        }
        if let Some(implicit) = self.implicit_mapping {
            options.implicit_mapping = implicit;
        }
    }

    fn merge_with(&mut self, other: &Self) {
        if other.accepts_return_values.is_some() {
            self.accepts_return_values = other.accepts_return_values;
        }
        if other.implicit_mapping.is_some() {
            self.implicit_mapping = other.implicit_mapping;
        }
    }
}

/// Declarative mapper configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    /// Schemes excluded from dispatch
    pub disabled_schemes: Vec<String>,
    /// Per-scheme option overrides
    pub schemes: BTreeMap<String, SchemeSettings>,
}

impl MapperConfig {
    /// Load configuration from a `.toml` or `.json` file
    ///
    /// Files without a `.toml` extension are parsed as JSON.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let path_display = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::config_io(&path_display, e.to_string()))?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| ConfigError::config_io(&path_display, format!("Invalid TOML: {e}")))?,
            _ => serde_json::from_str(&content)
                .map_err(|e| ConfigError::config_io(&path_display, format!("Invalid JSON: {e}")))?,
        };

        config.validate()?;
        tracing::debug!(
            path = %path_display,
            disabled = config.disabled_schemes.len(),
            overrides = config.schemes.len(),
            "Loaded mapper configuration"
        );
        Ok(config)
    }

    /// Merge `ERRMAP_DISABLED_SCHEMES` from the process environment
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Merge `ERRMAP_*` settings from an explicit variable list
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut from_env = Self::default();
        for (key, value) in vars {
            if key.as_ref() != DISABLED_SCHEMES_ENV {
                continue;
            }
            for name in value.as_ref().split(',').map(str::trim) {
                if name.is_empty() {
                    continue;
                }
                from_env.disable(name);
            }
        }
        self.merge_with(&from_env)
    }

    /// Merge `other` on top of this configuration
    ///
    /// Disabled sets are unioned; scheme overrides set in `other` win.
    /// A rejected merge leaves this configuration unchanged.
    pub fn merge_with(&mut self, other: &Self) -> Result<(), ConfigError> {
        let mut merged = self.clone();
        for name in &other.disabled_schemes {
            merged.disable(name);
        }
        for (name, settings) in &other.schemes {
            merged
                .schemes
                .entry(name.clone())
                .or_default()
                .merge_with(settings);
        }
        merged.validate()?;
        *self = merged;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(blank) = self
            .disabled_schemes
            .iter()
            .chain(self.schemes.keys())
            .find(|name| name.trim().is_empty())
        {
            return Err(ConfigError::invalid_config(format!(
                "scheme name '{blank}' is blank"
            )));
        }
        if let Some(conflict) = self
            .disabled_schemes
            .iter()
            .find(|name| self.schemes.contains_key(name.as_str()))
        {
            return Err(ConfigError::invalid_config(format!(
                "scheme '{conflict}' is both disabled and configured"
            )));
        }
        Ok(())
    }

    /// Disable `scheme`
    pub fn disable(&mut self, scheme: &str) {
        if !self.is_disabled(scheme) {
            self.disabled_schemes.push(scheme.to_string());
        }
    }

    /// Whether `scheme` is disabled
    pub fn is_disabled(&self, scheme: &str) -> bool {
        self.disabled_schemes.iter().any(|name| name == scheme)
    }

    /// Every scheme name the configuration refers to
    pub fn referenced_schemes(&self) -> impl Iterator<Item = &str> {
        self.disabled_schemes
            .iter()
            .map(String::as_str)
            .chain(self.schemes.keys().map(String::as_str))
    }
}
