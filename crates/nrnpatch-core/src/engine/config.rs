use crate::core::errors::rules::ErrorRules;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetConDefaults {
    pub weight: f64,
    pub delay: f64,
    pub threshold: f64,
}

impl Default for NetConDefaults {
    fn default() -> Self {
        Self {
            weight: 0.1,
            delay: 0.0,
            threshold: -20.0,
        }
    }
}

/// Defaults for the connection made by `PointProcess::stimulate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StimulusDefaults {
    pub weight: f64,
    pub delay: f64,
}

impl Default for StimulusDefaults {
    fn default() -> Self {
        Self {
            weight: 0.04,
            delay: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IClampDefaults {
    pub delay: f64,
    pub duration: f64,
    pub amplitude: f64,
}

impl Default for IClampDefaults {
    fn default() -> Self {
        Self {
            delay: 0.0,
            duration: 100.0,
            amplitude: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SEClampDefaults {
    pub delay: f64,
    pub duration: f64,
}

impl Default for SEClampDefaults {
    fn default() -> Self {
        Self {
            delay: 100.0,
            duration: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterConfig {
    /// Hoc file loaded when the interpreter is created.
    pub startup_file: String,
    pub celsius: f64,
    pub netcon: NetConDefaults,
    pub stimulus: StimulusDefaults,
    pub iclamp: IClampDefaults,
    pub seclamp: SEClampDefaults,
    /// Directory searched by `load_extension` for `<name>.hoc` files.
    pub extension_dir: PathBuf,
    /// Rules consulted after the built-in error translation rules.
    pub extra_rules: Option<PathBuf>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            startup_file: "stdrun.hoc".to_string(),
            celsius: 32.0,
            netcon: NetConDefaults::default(),
            stimulus: StimulusDefaults::default(),
            iclamp: IClampDefaults::default(),
            seclamp: SEClampDefaults::default(),
            extension_dir: PathBuf::from("extensions"),
            extra_rules: None,
        }
    }
}

impl InterpreterConfig {
    /// The built-in translation rules followed by the configured extra rules.
    pub fn error_rules(&self) -> Result<ErrorRules, crate::core::errors::rules::RuleLoadError> {
        let mut rules = ErrorRules::default();
        if let Some(path) = &self.extra_rules {
            rules.extend(ErrorRules::load(path)?);
        }
        Ok(rules)
    }
}

#[derive(Default)]
pub struct InterpreterConfigBuilder {
    startup_file: Option<String>,
    celsius: Option<f64>,
    netcon: Option<NetConDefaults>,
    stimulus: Option<StimulusDefaults>,
    iclamp: Option<IClampDefaults>,
    seclamp: Option<SEClampDefaults>,
    extension_dir: Option<PathBuf>,
    extra_rules: Option<PathBuf>,
}

impl InterpreterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn startup_file(mut self, file: impl Into<String>) -> Self {
        self.startup_file = Some(file.into());
        self
    }
    pub fn celsius(mut self, celsius: f64) -> Self {
        self.celsius = Some(celsius);
        self
    }
    pub fn netcon(mut self, defaults: NetConDefaults) -> Self {
        self.netcon = Some(defaults);
        self
    }
    pub fn stimulus(mut self, defaults: StimulusDefaults) -> Self {
        self.stimulus = Some(defaults);
        self
    }
    pub fn iclamp(mut self, defaults: IClampDefaults) -> Self {
        self.iclamp = Some(defaults);
        self
    }
    pub fn seclamp(mut self, defaults: SEClampDefaults) -> Self {
        self.seclamp = Some(defaults);
        self
    }
    pub fn extension_dir(mut self, dir: PathBuf) -> Self {
        self.extension_dir = Some(dir);
        self
    }
    pub fn extra_rules(mut self, path: PathBuf) -> Self {
        self.extra_rules = Some(path);
        self
    }

    pub fn build(self) -> Result<InterpreterConfig, ConfigError> {
        let defaults = InterpreterConfig::default();
        let config = InterpreterConfig {
            startup_file: self.startup_file.unwrap_or(defaults.startup_file),
            celsius: self.celsius.unwrap_or(defaults.celsius),
            netcon: self.netcon.unwrap_or(defaults.netcon),
            stimulus: self.stimulus.unwrap_or(defaults.stimulus),
            iclamp: self.iclamp.unwrap_or(defaults.iclamp),
            seclamp: self.seclamp.unwrap_or(defaults.seclamp),
            extension_dir: self.extension_dir.unwrap_or(defaults.extension_dir),
            extra_rules: self.extra_rules,
        };

        if config.startup_file.trim().is_empty() {
            return Err(ConfigError::MissingParameter("startup_file"));
        }
        for (name, value) in [
            ("netcon.delay", config.netcon.delay),
            ("stimulus.delay", config.stimulus.delay),
            ("iclamp.delay", config.iclamp.delay),
            ("iclamp.duration", config.iclamp.duration),
            ("seclamp.delay", config.seclamp.delay),
            ("seclamp.duration", config.seclamp.duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("expected a non-negative time, got {}", value),
                });
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_without_overrides_matches_default() {
        let config = InterpreterConfigBuilder::new().build().unwrap();
        assert_eq!(config, InterpreterConfig::default());
        assert_eq!(config.netcon.threshold, -20.0);
        assert_eq!(config.seclamp.delay, 100.0);
    }

    #[test]
    fn builder_applies_overrides() {
        let config = InterpreterConfigBuilder::new()
            .celsius(36.0)
            .netcon(NetConDefaults {
                weight: 1.0,
                delay: 2.0,
                threshold: 0.0,
            })
            .build()
            .unwrap();
        assert_eq!(config.celsius, 36.0);
        assert_eq!(config.netcon.delay, 2.0);
    }

    #[test]
    fn empty_startup_file_is_rejected() {
        let err = InterpreterConfigBuilder::new()
            .startup_file("  ")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("startup_file"));
    }

    #[test]
    fn negative_delays_are_rejected() {
        let err = InterpreterConfigBuilder::new()
            .iclamp(IClampDefaults {
                delay: -1.0,
                ..IClampDefaults::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "iclamp.delay", .. }));
    }
}
