use super::{HocError, PatchError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// The interpreter operation a captured error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    NetCon,
    SectionAccess,
    Record,
    /// Any operation. As a rule's operation it applies everywhere; as the
    /// operation being translated only `Any` rules apply.
    Any,
}

impl Operation {
    fn applies_to(self, operation: Operation) -> bool {
        self == Operation::Any || self == operation
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::NetCon => "net-con",
            Operation::SectionAccess => "section-access",
            Operation::Record => "record",
            Operation::Any => "any",
        };
        f.write_str(s)
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "net-con" | "netcon" => Ok(Operation::NetCon),
            "section-access" => Ok(Operation::SectionAccess),
            "record" => Ok(Operation::Record),
            "any" => Ok(Operation::Any),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// The [`HocError`] variant a matching rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    General,
    Connect,
    SectionAccess,
    Record,
}

impl ErrorKind {
    fn into_error(self, message: String) -> HocError {
        match self {
            ErrorKind::General => HocError::General(message),
            ErrorKind::Connect => HocError::Connect(message),
            ErrorKind::SectionAccess => HocError::SectionAccess(message),
            ErrorKind::Record => HocError::Record(message),
        }
    }
}

/// Matches captured text when every listed fragment occurs in it.
/// Fragments in `all_of` match exactly; fragments in `any_case` ignore case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Matcher {
    #[serde(default)]
    pub all_of: Vec<String>,
    #[serde(default)]
    pub any_case: Vec<String>,
}

impl Matcher {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all_of: fragments.into_iter().map(Into::into).collect(),
            any_case: Vec::new(),
        }
    }

    /// Adds a fragment that matches regardless of case.
    pub fn and_any_case(mut self, fragment: impl Into<String>) -> Self {
        self.any_case.push(fragment.into());
        self
    }

    pub fn matches(&self, text: &str) -> bool {
        if !self.all_of.iter().all(|fragment| text.contains(fragment.as_str())) {
            return false;
        }
        if self.any_case.is_empty() {
            return true;
        }
        let folded = text.to_lowercase();
        self.any_case
            .iter()
            .all(|fragment| folded.contains(&fragment.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorRule {
    pub operation: Operation,
    pub matcher: Matcher,
    pub kind: ErrorKind,
    /// Message template; `{key}` placeholders are filled from the [`ErrorContext`].
    pub message: String,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Named values describing the failed call, available to message templates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    values: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    #[serde(default)]
    rule: Vec<ErrorRule>,
}

/// An ordered table of translation rules. The first matching rule wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRules {
    rules: Vec<ErrorRule>,
}

impl Default for ErrorRules {
    fn default() -> Self {
        let netcon_context = || vec!["source".to_string(), "target".to_string()];
        Self {
            rules: vec![
                ErrorRule {
                    operation: Operation::NetCon,
                    matcher: Matcher::new(["arg 1"])
                        .and_any_case("must be a point process or nullobject"),
                    kind: ErrorKind::Connect,
                    message: "Source is not a point process. Transformed type: '{source}'"
                        .to_string(),
                    requires: netcon_context(),
                },
                ErrorRule {
                    operation: Operation::NetCon,
                    matcher: Matcher::new(["arg 2"])
                        .and_any_case("must be a point process or nullobject"),
                    kind: ErrorKind::Connect,
                    message: "Target is not a point process. Transformed type: '{target}'"
                        .to_string(),
                    requires: netcon_context(),
                },
                ErrorRule {
                    operation: Operation::NetCon,
                    matcher: Matcher::new(["interpreter stack type error"]),
                    kind: ErrorKind::Connect,
                    message: "Incorrect types passed to NetCon. Source: {source}, target: {target}"
                        .to_string(),
                    requires: netcon_context(),
                },
                ErrorRule {
                    operation: Operation::SectionAccess,
                    matcher: Matcher::new(["Section access unspecified"]),
                    kind: ErrorKind::SectionAccess,
                    message: "This operation requires a Section on the stack.".to_string(),
                    requires: Vec::new(),
                },
            ],
        }
    }
}

impl ErrorRules {
    pub fn new(rules: Vec<ErrorRule>) -> Self {
        Self { rules }
    }

    /// Reads a table from a TOML file made of `[[rule]]` entries.
    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| RuleLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: RuleFile = toml::from_str(&content).map_err(|e| RuleLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Ok(Self { rules: file.rule })
    }

    /// Appends the rules of `other`; they are consulted after the existing ones.
    pub fn extend(&mut self, other: ErrorRules) {
        self.rules.extend(other.rules);
    }

    pub fn rules(&self) -> &[ErrorRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Turns a failed interpreter call into a typed error.
    ///
    /// `captured` is what the interpreter wrote to its error stream during the call,
    /// `fault` the message of the failure itself.
    pub fn translate(
        &self,
        operation: Operation,
        captured: &str,
        fault: &str,
        context: &ErrorContext,
    ) -> PatchError {
        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.operation.applies_to(operation) {
                continue;
            }
            if let Some(missing) = rule.requires.iter().find(|key| !context.contains(key)) {
                return PatchError::ErrorHandling(format!(
                    "Required error context item '{}' for {} rule #{} is missing",
                    missing, rule.operation, index
                ));
            }
            if rule.matcher.matches(captured) {
                return match render(&rule.message, context) {
                    Ok(message) => rule.kind.into_error(message).into(),
                    Err(err) => err,
                };
            }
        }

        if fault.contains("hoc error") {
            HocError::General(captured.to_string()).into()
        } else {
            PatchError::Foreign(fault.to_string())
        }
    }
}

fn render(template: &str, context: &ErrorContext) -> Result<String, PatchError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let end = tail.find('}').ok_or_else(|| {
            PatchError::ErrorHandling(format!("Unterminated placeholder in '{}'", template))
        })?;
        let key = &tail[..end];
        let value = context.get(key).ok_or_else(|| {
            PatchError::ErrorHandling(format!(
                "Message template '{}' references unknown context item '{}'",
                template, key
            ))
        })?;
        out.push_str(value);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn netcon_context() -> ErrorContext {
        ErrorContext::new()
            .with("source", "hoc.HocObject")
            .with("target", "float")
    }

    #[test]
    fn netcon_target_error_is_translated_to_connect_error() {
        let rules = ErrorRules::default();
        let captured = "NEURON: arg 2 must be a point process or NULLObject\n near line 0\n";
        let err = rules.translate(Operation::NetCon, captured, "hoc error", &netcon_context());
        assert_eq!(
            err,
            PatchError::Hoc(HocError::Connect(
                "Target is not a point process. Transformed type: 'float'".into()
            ))
        );
    }

    #[test]
    fn only_the_point_process_fragment_ignores_case() {
        let rules = ErrorRules::default();
        let folded = rules.translate(
            Operation::NetCon,
            "NEURON: arg 1 MUST BE A POINT PROCESS OR NULLOBJECT",
            "hoc error",
            &netcon_context(),
        );
        assert!(matches!(folded, PatchError::Hoc(HocError::Connect(_))));

        let captured = "NEURON: ARG 1 must be a point process or NULLObject";
        let shouted = rules.translate(Operation::NetCon, captured, "hoc error", &netcon_context());
        assert_eq!(shouted, PatchError::Hoc(HocError::General(captured.into())));
    }

    #[test]
    fn matcher_requires_exact_and_case_folded_fragments() {
        let matcher = Matcher::new(["Vector"]).and_any_case("not a pointer");
        assert!(matcher.matches("Vector: NOT A POINTER"));
        assert!(!matcher.matches("vector: not a pointer"));
        assert!(!matcher.matches("Vector: pointer"));
        assert!(Matcher::new(["x"]).matches("x"));
        assert!(!Matcher::new(["x"]).matches("X"));
    }

    #[test]
    fn stack_type_error_mentions_both_endpoints() {
        let rules = ErrorRules::default();
        let err = rules.translate(
            Operation::NetCon,
            "NEURON: interpreter stack type error",
            "hoc error",
            &netcon_context(),
        );
        assert_eq!(
            err.to_string(),
            "connection error: Incorrect types passed to NetCon. Source: hoc.HocObject, target: float"
        );
    }

    #[test]
    fn missing_required_context_is_an_error_handling_failure() {
        let rules = ErrorRules::default();
        let context = ErrorContext::new().with("source", "x");
        let err = rules.translate(Operation::NetCon, "anything", "hoc error", &context);
        assert!(matches!(err, PatchError::ErrorHandling(msg) if msg.contains("'target'")));
    }

    #[test]
    fn unmatched_hoc_errors_fall_back_to_general_with_captured_text() {
        let rules = ErrorRules::default();
        let err = rules.translate(
            Operation::SectionAccess,
            "NEURON: something else",
            "hoc error",
            &ErrorContext::new(),
        );
        assert_eq!(err, PatchError::Hoc(HocError::General("NEURON: something else".into())));
    }

    #[test]
    fn non_hoc_failures_pass_through_as_foreign() {
        let rules = ErrorRules::default();
        let err = rules.translate(Operation::Any, "", "segmentation fault", &ErrorContext::new());
        assert_eq!(err, PatchError::Foreign("segmentation fault".into()));
    }

    #[test]
    fn rules_for_other_operations_are_not_consulted() {
        let rules = ErrorRules::default();
        let err = rules.translate(
            Operation::Record,
            "Section access unspecified",
            "hoc error",
            &ErrorContext::new(),
        );
        assert!(matches!(err, PatchError::Hoc(HocError::General(_))));
    }

    #[test]
    fn load_reads_rules_from_toml_and_extend_appends_them() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[rule]]
operation = "record"
kind = "record"
message = "Cannot record {{what}}"
requires = ["what"]

[rule.matcher]
any_case = ["not a pointer"]
"#
        )
        .unwrap();

        let loaded = ErrorRules::load(file.path()).unwrap();
        assert_eq!(loaded.len(), 1);

        let mut rules = ErrorRules::default();
        rules.extend(loaded);
        assert_eq!(rules.len(), 5);

        let context = ErrorContext::new().with("what", "float");
        let err = rules.translate(Operation::Record, "NEURON: Not A Pointer", "hoc error", &context);
        assert_eq!(err, PatchError::Hoc(HocError::Record("Cannot record float".into())));
    }

    #[test]
    fn load_reports_toml_errors_with_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[[rule]]\noperation = \"teleport\"").unwrap();
        let err = ErrorRules::load(file.path()).unwrap_err();
        assert!(matches!(err, RuleLoadError::Toml { .. }));
    }

    #[test]
    fn templates_with_unknown_keys_fail_to_render() {
        let rules = ErrorRules::new(vec![ErrorRule {
            operation: Operation::Any,
            matcher: Matcher::new(["boom"]),
            kind: ErrorKind::General,
            message: "{missing}".into(),
            requires: Vec::new(),
        }]);
        let err = rules.translate(Operation::Any, "boom", "hoc error", &ErrorContext::new());
        assert!(matches!(err, PatchError::ErrorHandling(_)));
    }
}
