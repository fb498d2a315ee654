//! Variable store and substitution.
//!
//! Variables live in four layers of increasing precedence — environment,
//! included, file, captured — so that a debugging snapshot can attribute
//! every value to the layer it came from, rather than flattening into a
//! single map. The store is owned exclusively by the [`crate::orchestrator`]
//! for the duration of one file's run and mutated only between test
//! executions.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// The layer a variable's value was found in, exposed for debugging
/// snapshots (`TestResult.variable_snapshot`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum VarLayer {
    Environment,
    Included,
    File,
    Captured,
}

impl std::fmt::Display for VarLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VarLayer::Environment => "Environment",
            VarLayer::Included => "Included",
            VarLayer::File => "File",
            VarLayer::Captured => "Captured",
        };
        f.write_str(s)
    }
}

/// Failure resolving a `$name` or `$env:NAME` reference.
#[derive(Debug, Error, Clone)]
pub enum VariableError {
    /// `$env:NAME` referenced an environment variable that isn't set.
    #[error("environment variable '{0}' is not set")]
    EnvNotFound(String),

    /// `$name` referenced a variable absent from every layer.
    #[error("variable '{0}' not found. Available variables: {1}")]
    NotFound(String, String),

    /// A structured body combined with an unsupported content type.
    #[error("structured body is not supported for content type '{0}'")]
    UnsupportedStructuredBody(String),
}

fn ident_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$env:([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

fn var_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

/// Four-layer precedence map over JSON-valued variables.
///
/// Lookup order (highest precedence first): captured, file, included,
/// environment. Environment variables are read lazily and are deliberately
/// excluded from [`VariableStore::snapshot`] so reports never leak
/// process-global state.
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    included: HashMap<String, Value>,
    file: HashMap<String, Value>,
    captured: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the included layer wholesale.
    pub fn set_included(&mut self, map: HashMap<String, Value>) {
        self.included = map;
    }

    /// Merges into the file layer; later keys win on conflict.
    pub fn update_file(&mut self, map: HashMap<String, Value>) {
        self.file.extend(map);
    }

    /// Merges into the captured layer; later keys win on conflict.
    pub fn set_captured(&mut self, map: HashMap<String, Value>) {
        self.captured.extend(map);
    }

    /// Looks up a variable across all four layers, highest precedence first.
    pub fn get(&self, name: &str) -> Option<(Value, VarLayer)> {
        if let Some(v) = self.captured.get(name) {
            return Some((v.clone(), VarLayer::Captured));
        }
        if let Some(v) = self.file.get(name) {
            return Some((v.clone(), VarLayer::File));
        }
        if let Some(v) = self.included.get(name) {
            return Some((v.clone(), VarLayer::Included));
        }
        if let Ok(v) = std::env::var(name) {
            return Some((Value::String(v), VarLayer::Environment));
        }
        None
    }

    fn available_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .captured
            .keys()
            .chain(self.file.keys())
            .chain(self.included.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Resolves `$env:NAME` and `$name` references in `text`.
    ///
    /// Two ordered passes: `$env:IDENT` is replaced first (failing if the
    /// environment variable is absent), then `$IDENT` is replaced from the
    /// layered store. An identifier that was the head of an already-replaced
    /// `$env:IDENT` is left untouched on the second pass (e.g. `$env:HOST`
    /// does not get its trailing `HOST` re-substituted as `$HOST`).
    pub fn resolve(&self, text: &str) -> Result<String, VariableError> {
        let mut err: Option<VariableError> = None;
        let after_env = ident_pattern().replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(v) => v,
                Err(_) => {
                    if err.is_none() {
                        err = Some(VariableError::EnvNotFound(name.to_string()));
                    }
                    String::new()
                }
            }
        });
        if let Some(e) = err {
            return Err(e);
        }

        // `$env:` consumes the `env:` token itself, so a bare `$IDENT` pass
        // can never re-match the tail of an already-substituted `$env:IDENT`.
        let mut err: Option<VariableError> = None;
        let result = var_pattern().replace_all(&after_env, |caps: &regex::Captures| {
            let name = &caps[1];
            match self.get(name) {
                Some((v, _)) => value_to_text(&v),
                None => {
                    if err.is_none() {
                        err = Some(VariableError::NotFound(
                            name.to_string(),
                            self.available_names().join(", "),
                        ));
                    }
                    String::new()
                }
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(result.into_owned())
    }

    /// Recursively resolves every string scalar in a structured YAML/JSON
    /// value; numbers and booleans pass through unchanged.
    pub fn resolve_deep(&self, value: &Value) -> Result<Value, VariableError> {
        match value {
            Value::String(s) => Ok(Value::String(self.resolve(s)?)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_deep(item)?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_deep(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Snapshot of every non-environment variable, for debugging.
    pub fn snapshot(&self) -> HashMap<String, (Value, VarLayer)> {
        let mut out = HashMap::new();
        for (k, v) in &self.included {
            out.insert(k.clone(), (v.clone(), VarLayer::Included));
        }
        for (k, v) in &self.file {
            out.insert(k.clone(), (v.clone(), VarLayer::File));
        }
        for (k, v) in &self.captured {
            out.insert(k.clone(), (v.clone(), VarLayer::Captured));
        }
        out
    }
}

/// Renders a JSON value the way a resolved `$var` substitution should appear
/// inline in text (strings unquoted, everything else via its JSON form).
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
