//! Template Variables
//!
//! Substitutes dashboard template variables into the text fields of a
//! target. The registry holding dashboard-wide variables is injected into
//! the resolver rather than looked up globally.
//!
//! # Reference Syntax
//!
//! ```text
//! $name
//! ${name}
//! ${name:format}     format = json | raw | csv | pipe | glob
//! [[name]]
//! [[name:format]]
//! ```
//!
//! References to unknown names are left untouched, so MongoDB operators
//! such as `$match` or `$gte` survive unless a variable of that name exists.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::model::{Query, ScopedVars, VariableValue};

/// How substituted values are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceMode {
    /// Values inserted verbatim, multi-values as `{a,b}`
    #[default]
    Plain,
    /// Values escaped for use inside JSON text
    ///
    /// A single value is written as string content without quotes, so it
    /// belongs inside `"..."`. A multi-value is written as an array literal,
    /// so it belongs outside quotes: `"$hosts"` with a multi-value produces
    /// invalid JSON.
    Json,
}

/// Source of template variable values
pub trait VariableRegistry: Send + Sync {
    /// Replace every variable reference in `text`
    fn replace(&self, text: &str, scoped_vars: &ScopedVars, mode: ReplaceMode) -> String;
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"\$([A-Za-z0-9_]+)",
            r"|\$\{([A-Za-z0-9_]+)(?::([^}]+))?\}",
            r"|\[\[([A-Za-z0-9_]+)(?::([^\]]+))?\]\]",
        ))
        .expect("variable reference pattern is valid")
    })
}

/// Dashboard variables known for the lifetime of a dashboard
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    variables: BTreeMap<String, VariableValue>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a dashboard variable
    pub fn register(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<VariableValue>,
    ) -> Self {
        self.register(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Scoped bindings take precedence over registered variables
    fn lookup<'a>(&'a self, name: &str, scoped_vars: &'a ScopedVars) -> Option<&'a VariableValue> {
        scoped_vars
            .get(name)
            .map(|v| &v.value)
            .or_else(|| self.variables.get(name))
    }
}

impl VariableRegistry for TemplateRegistry {
    fn replace(&self, text: &str, scoped_vars: &ScopedVars, mode: ReplaceMode) -> String {
        reference_pattern()
            .replace_all(text, |caps: &Captures| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(4))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                let format = caps.get(3).or_else(|| caps.get(5)).map(|m| m.as_str());

                match self.lookup(name, scoped_vars) {
                    Some(value) => format_value(value, format, mode),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn format_value(value: &VariableValue, format: Option<&str>, mode: ReplaceMode) -> String {
    let values = value.values();
    match format {
        Some("json") => json_value(value),
        Some("raw") | Some("csv") => values.join(","),
        Some("pipe") => values.join("|"),
        Some("glob") => glob_value(values),
        Some(other) => {
            tracing::debug!(format = other, "unknown variable format, using default");
            default_value(value, mode)
        }
        None => default_value(value, mode),
    }
}

fn default_value(value: &VariableValue, mode: ReplaceMode) -> String {
    match mode {
        ReplaceMode::Plain => match value {
            VariableValue::Single(v) => v.clone(),
            VariableValue::Multi(vs) => glob_value(vs),
        },
        ReplaceMode::Json => json_value(value),
    }
}

fn glob_value(values: &[String]) -> String {
    match values {
        [single] => single.clone(),
        _ => format!("{{{}}}", values.join(",")),
    }
}

/// A single value becomes escaped string content (no quotes), several
/// values a JSON array literal
fn json_value(value: &VariableValue) -> String {
    match value {
        VariableValue::Single(v) => {
            let quoted = Value::String(v.clone()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        VariableValue::Multi(vs) => {
            Value::Array(vs.iter().cloned().map(Value::String).collect()).to_string()
        }
    }
}

/// Applies a registry to the text fields of a target
#[derive(Clone)]
pub struct TemplateVariableResolver {
    registry: Arc<dyn VariableRegistry>,
}

impl TemplateVariableResolver {
    pub fn new(registry: Arc<dyn VariableRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve database, collection and aggregation of `query`
    ///
    /// Absent fields come back as empty strings. The aggregation is
    /// substituted in JSON mode; all other fields are copied unchanged.
    pub fn resolve(&self, query: &Query, scoped_vars: &ScopedVars) -> Query {
        Query {
            database: Some(self.replace_field(&query.database, scoped_vars, ReplaceMode::Plain)),
            collection: Some(self.replace_field(
                &query.collection,
                scoped_vars,
                ReplaceMode::Plain,
            )),
            aggregation: Some(self.replace_field(
                &query.aggregation,
                scoped_vars,
                ReplaceMode::Json,
            )),
            ..query.clone()
        }
    }

    fn replace_field(
        &self,
        field: &Option<String>,
        scoped_vars: &ScopedVars,
        mode: ReplaceMode,
    ) -> String {
        match field.as_deref() {
            Some(text) if !text.is_empty() => self.registry.replace(text, scoped_vars, mode),
            _ => String::new(),
        }
    }
}

impl std::fmt::Debug for TemplateVariableResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateVariableResolver").finish_non_exhaustive()
    }
}
