use crate::cli::BuildArgs;
use crate::config::PartialInterpreterConfig;
use crate::error::Result;
use nrnpatch::core::hoc::memory::MemoryHoc;
use nrnpatch::engine::interpreter::Interpreter;
use nrnpatch::workflows::build::{self, BuiltModel, ModelSpec};
use std::io::Write;
use tracing::info;

pub fn run(args: BuildArgs) -> Result<()> {
    let partial = match &args.config {
        Some(path) => PartialInterpreterConfig::from_file(path)?,
        None => PartialInterpreterConfig::default(),
    };
    let config = partial.merge_with_cli(&args)?;

    info!("Loading model from {:?}", args.model);
    let spec = ModelSpec::load(&args.model)?;

    let mut interp = Interpreter::new(Box::new(MemoryHoc::new()), config)?;
    let model = build::run(&mut interp, &spec)?;
    let transcript = interp.hoc().transcript();

    match &args.transcript {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            write_transcript(&mut file, &transcript)?;
            info!("Transcript with {} lines written to {:?}", transcript.len(), path);
        }
        None => write_transcript(&mut std::io::stdout().lock(), &transcript)?,
    }

    println!("{}", summary(spec.name.as_deref(), &model, interp.live_objects()));
    Ok(())
}

fn write_transcript(out: &mut impl Write, lines: &[String]) -> std::io::Result<()> {
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}

fn summary(name: Option<&str>, model: &BuiltModel, live: usize) -> String {
    format!(
        "Built '{}': {} sections, {} synapses, {} stimuli, {} connections, {} clamps, {} recordings ({} live objects).",
        name.unwrap_or("unnamed"),
        model.sections.len(),
        model.synapses.len(),
        model.stimuli.len(),
        model.connections.len(),
        model.clamps.len(),
        model.recordings.len(),
        live
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::error::CliError;
    use clap::Parser;
    use std::fs;
    use std::path::Path;

    const MODEL: &str = r#"
name = "ball-and-stick"

[[section]]
name = "soma"
length = 20.0
diameter = 20.0
mechanisms = ["hh"]

[[section]]
name = "dend"
parent = "soma"
length = 200.0

[[synapse]]
name = "syn"
section = "dend"
template = "ExpSyn"

[[stimulus]]
name = "drive"
target = "syn"
number = 1.0
"#;

    fn args_for(model: &Path, extra: &[&str]) -> BuildArgs {
        let mut args = vec![
            "nrnpatch".to_string(),
            "build".to_string(),
            "-m".to_string(),
            model.to_string_lossy().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(args).command {
            Commands::Build(args) => args,
            other => panic!("Expected 'build' subcommand, got {:?}", other),
        }
    }

    #[test]
    fn build_writes_the_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.toml");
        let transcript = dir.path().join("model.hoc");
        fs::write(&model, MODEL).unwrap();

        let transcript_arg = transcript.to_string_lossy().to_string();
        run(args_for(&model, &["-t", &transcript_arg])).unwrap();

        let content = fs::read_to_string(&transcript).unwrap();
        assert!(content.contains("soma = new Section("));
        assert!(content.contains("NetStim[0] = new NetStim("));
    }

    #[test]
    fn missing_model_is_a_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(args_for(&dir.path().join("absent.toml"), &[]));
        assert!(matches!(result, Err(CliError::Build(_))));
    }

    #[test]
    fn summary_counts_every_table() {
        let model = BuiltModel::default();
        assert_eq!(
            summary(None, &model, 0),
            "Built 'unnamed': 0 sections, 0 synapses, 0 stimuli, 0 connections, 0 clamps, 0 recordings (0 live objects)."
        );
    }

    #[test]
    fn transcript_lines_are_newline_terminated() {
        let mut out = Vec::new();
        write_transcript(&mut out, &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(out, b"a\nb\n");
    }
}
