use crate::cli::BuildArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use nrnpatch::engine::config::{
    IClampDefaults, InterpreterConfig, InterpreterConfigBuilder, NetConDefaults, SEClampDefaults,
    StimulusDefaults,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialNetConDefaults {
    weight: Option<f64>,
    delay: Option<f64>,
    threshold: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialStimulusDefaults {
    weight: Option<f64>,
    delay: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialIClampDefaults {
    delay: Option<f64>,
    duration: Option<f64>,
    amplitude: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialSEClampDefaults {
    delay: Option<f64>,
    duration: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialInterpreterConfig {
    startup_file: Option<String>,
    celsius: Option<f64>,
    extension_dir: Option<PathBuf>,
    extra_rules: Option<PathBuf>,
    netcon: Option<PartialNetConDefaults>,
    stimulus: Option<PartialStimulusDefaults>,
    iclamp: Option<PartialIClampDefaults>,
    seclamp: Option<PartialSEClampDefaults>,
}

impl PartialInterpreterConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn merge_with_cli(mut self, args: &BuildArgs) -> Result<InterpreterConfig> {
        self.apply_set_values(&args.set_values)?;
        if args.celsius.is_some() {
            self.celsius = args.celsius;
        }

        let netcon = self.netcon.take().unwrap_or_default();
        let stimulus = self.stimulus.take().unwrap_or_default();
        let iclamp = self.iclamp.take().unwrap_or_default();
        let seclamp = self.seclamp.take().unwrap_or_default();

        let defaults = InterpreterConfig::default();
        let mut builder = InterpreterConfigBuilder::new()
            .netcon(NetConDefaults {
                weight: netcon.weight.unwrap_or(defaults.netcon.weight),
                delay: netcon.delay.unwrap_or(defaults.netcon.delay),
                threshold: netcon.threshold.unwrap_or(defaults.netcon.threshold),
            })
            .stimulus(StimulusDefaults {
                weight: stimulus.weight.unwrap_or(defaults.stimulus.weight),
                delay: stimulus.delay.unwrap_or(defaults.stimulus.delay),
            })
            .iclamp(IClampDefaults {
                delay: iclamp.delay.unwrap_or(defaults.iclamp.delay),
                duration: iclamp.duration.unwrap_or(defaults.iclamp.duration),
                amplitude: iclamp.amplitude.unwrap_or(defaults.iclamp.amplitude),
            })
            .seclamp(SEClampDefaults {
                delay: seclamp.delay.unwrap_or(defaults.seclamp.delay),
                duration: seclamp.duration.unwrap_or(defaults.seclamp.duration),
            });

        if let Some(file) = self.startup_file {
            builder = builder.startup_file(file);
        }
        if let Some(celsius) = self.celsius {
            builder = builder.celsius(celsius);
        }
        if let Some(dir) = self.extension_dir {
            builder = builder.extension_dir(dir);
        }
        if let Some(path) = self.extra_rules {
            builder = builder.extra_rules(path);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for pair in set_values {
            let (key, value) =
                parser::parse_key_value(pair).map_err(|e| CliError::Config(e.to_string()))?;
            match key {
                "startup-file" => self.startup_file = Some(value.to_string()),
                "extension-dir" => self.extension_dir = Some(PathBuf::from(value)),
                "extra-rules" => self.extra_rules = Some(PathBuf::from(value)),
                _ => {
                    let number = parser::parse_number(key, value)
                        .map_err(|e| CliError::Config(e.to_string()))?;
                    *self.number_slot(key)? = Some(number);
                }
            }
        }
        Ok(())
    }

    fn number_slot(&mut self, key: &str) -> Result<&mut Option<f64>> {
        let slot = match key {
            "celsius" => &mut self.celsius,
            "netcon.weight" => &mut self.netcon.get_or_insert_with(Default::default).weight,
            "netcon.delay" => &mut self.netcon.get_or_insert_with(Default::default).delay,
            "netcon.threshold" => &mut self.netcon.get_or_insert_with(Default::default).threshold,
            "stimulus.weight" => &mut self.stimulus.get_or_insert_with(Default::default).weight,
            "stimulus.delay" => &mut self.stimulus.get_or_insert_with(Default::default).delay,
            "iclamp.delay" => &mut self.iclamp.get_or_insert_with(Default::default).delay,
            "iclamp.duration" => &mut self.iclamp.get_or_insert_with(Default::default).duration,
            "iclamp.amplitude" => &mut self.iclamp.get_or_insert_with(Default::default).amplitude,
            "seclamp.delay" => &mut self.seclamp.get_or_insert_with(Default::default).delay,
            "seclamp.duration" => &mut self.seclamp.get_or_insert_with(Default::default).duration,
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        };
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("interpreter.toml");
        fs::write(&path, content).unwrap();
        path
    }

    fn build_args(extra: &[&str]) -> BuildArgs {
        let mut args = vec!["nrnpatch", "build", "-m", "model.toml"];
        args.extend_from_slice(extra);
        match Cli::parse_from(args).command {
            Commands::Build(args) => args,
            other => panic!("Expected 'build' subcommand, got {:?}", other),
        }
    }

    #[test]
    fn file_values_fill_the_builder() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            celsius = 6.3
            startup-file = "nrngui.hoc"

            [netcon]
            weight = 0.5

            [seclamp]
            delay = 10.0
            "#,
        );
        let config = PartialInterpreterConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&build_args(&[]))
            .unwrap();
        assert_eq!(config.celsius, 6.3);
        assert_eq!(config.startup_file, "nrngui.hoc");
        assert_eq!(config.netcon.weight, 0.5);
        assert_eq!(config.netcon.threshold, -20.0);
        assert_eq!(config.seclamp.delay, 10.0);
        assert_eq!(config.seclamp.duration, 100.0);
    }

    #[test]
    fn cli_values_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "celsius = 6.3\n[netcon]\nweight = 0.5\n");
        let args = build_args(&["--celsius", "37", "-S", "netcon.weight=2", "-S", "iclamp.amplitude=0.1"]);
        let config = PartialInterpreterConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&args)
            .unwrap();
        assert_eq!(config.celsius, 37.0);
        assert_eq!(config.netcon.weight, 2.0);
        assert_eq!(config.iclamp.amplitude, 0.1);
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let config = PartialInterpreterConfig::default()
            .merge_with_cli(&build_args(&[]))
            .unwrap();
        assert_eq!(config, InterpreterConfig::default());
    }

    #[test]
    fn unsupported_and_malformed_set_values_are_config_errors() {
        for value in ["netcon.color=1", "celsius=warm", "celsius"] {
            let result = PartialInterpreterConfig::default().merge_with_cli(&build_args(&["-S", value]));
            assert!(matches!(result, Err(CliError::Config(_))), "{}", value);
        }
    }

    #[test]
    fn invalid_values_are_rejected_by_the_builder() {
        let result = PartialInterpreterConfig::default()
            .merge_with_cli(&build_args(&["-S", "seclamp.duration=-1"]));
        match result {
            Err(CliError::Config(msg)) => assert!(msg.contains("seclamp.duration")),
            other => panic!("Expected a config error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_keys_in_the_file_fail_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "temperature = 6.3\n");
        assert!(matches!(
            PartialInterpreterConfig::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }
}
