use crate::cli::ClassifyArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use nrnpatch::core::errors::rules::{ErrorContext, ErrorRules, Operation};
use nrnpatch::core::errors::{HocError, PatchError};
use std::io::Read;
use tracing::{debug, info};

pub fn run(args: ClassifyArgs) -> Result<()> {
    let operation: Operation = args.operation.parse().map_err(CliError::Argument)?;
    let captured = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut rules = ErrorRules::default();
    if let Some(path) = &args.rules {
        let extra = ErrorRules::load(path)?;
        info!("Loaded {} additional rules from {:?}", extra.len(), path);
        rules.extend(extra);
    }

    let context = parse_context(&args.context)?;
    let error = rules.translate(operation, &captured, &args.fault, &context);
    debug!(%operation, "Translated captured output: {:?}", error);
    println!("{}", describe(&error));
    Ok(())
}

fn parse_context(pairs: &[String]) -> Result<ErrorContext> {
    let mut context = ErrorContext::new();
    for pair in pairs {
        let (key, value) =
            parser::parse_key_value(pair).map_err(|e| CliError::Argument(e.to_string()))?;
        context.insert(key, value);
    }
    Ok(context)
}

fn category(error: &PatchError) -> &'static str {
    match error {
        PatchError::Hoc(HocError::General(_)) => "hoc",
        PatchError::Hoc(HocError::Connect(_)) => "connect",
        PatchError::Hoc(HocError::SectionAccess(_)) => "section-access",
        PatchError::Hoc(HocError::Record(_)) => "record",
        PatchError::ErrorHandling(_) => "error-handling",
        _ => "foreign",
    }
}

fn describe(error: &PatchError) -> String {
    format!("[{}] {}", category(error), error)
}
