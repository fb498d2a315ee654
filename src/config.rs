//! External variables file loading.
//!
//! A `.yaml`/`.yml` file referenced from a Config block's `include:` list is
//! either a bare mapping (every top-level key but `include` is a variable) or
//! an explicit `{variables: {...}, include: [...]}` shape.
//! Includes may themselves include further files; a per-call processing
//! stack rejects revisits as [`IncludeError::CircularInclude`], and a
//! processed set avoids re-reading a file already finished earlier in the
//! same call.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("circular include: {}", join_cycle(.0))]
    CircularInclude(Vec<PathBuf>),

    #[error("include file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn join_cycle(path: &[PathBuf]) -> String {
    path.iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Loads the variables contributed by a Config block's `include:` list,
/// resolving relative paths against `base_dir` (the including file's
/// directory).
pub fn load_includes(
    include_paths: &[String],
    base_dir: &Path,
) -> Result<HashMap<String, Value>, IncludeError> {
    let mut loader = IncludeLoader::default();
    let mut merged = HashMap::new();
    for rel in include_paths {
        let path = resolve(base_dir, rel);
        let vars = loader.load(&path)?;
        merged.extend(vars);
    }
    Ok(merged)
}

fn resolve(base_dir: &Path, rel: &str) -> PathBuf {
    let p = Path::new(rel);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

#[derive(Default)]
struct IncludeLoader {
    processing: Vec<PathBuf>,
    #[allow(dead_code)]
    processed: HashSet<PathBuf>,
    cache: HashMap<PathBuf, HashMap<String, Value>>,
}

impl IncludeLoader {
    fn load(&mut self, path: &Path) -> Result<HashMap<String, Value>, IncludeError> {
        let canonical = path.to_path_buf();

        if let Some(cached) = self.cache.get(&canonical) {
            return Ok(cached.clone());
        }
        if self.processing.contains(&canonical) {
            let mut cycle = self.processing.clone();
            cycle.push(canonical);
            return Err(IncludeError::CircularInclude(cycle));
        }
        if !canonical.exists() {
            return Err(IncludeError::NotFound(canonical));
        }

        self.processing.push(canonical.clone());

        let content = std::fs::read_to_string(&canonical).map_err(|e| IncludeError::Io {
            path: canonical.clone(),
            source: e,
        })?;
        let doc: Value = serde_yaml::from_str(&content).map_err(|e| IncludeError::Yaml {
            path: canonical.clone(),
            source: e,
        })?;

        let (own_vars, nested_includes) = split_document(&doc);

        let base_dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut merged = HashMap::new();
        for rel in &nested_includes {
            let nested_path = resolve(&base_dir, rel);
            let nested_vars = self.load(&nested_path)?;
            merged.extend(nested_vars);
        }
        // Own variables win over nested includes.
        merged.extend(own_vars);

        self.processing.pop();
        self.processed.insert(canonical.clone());
        self.cache.insert(canonical, merged.clone());

        Ok(merged)
    }
}

/// Splits a parsed variables-file document into `(variables, include_paths)`.
fn split_document(doc: &Value) -> (HashMap<String, Value>, Vec<String>) {
    let Value::Object(map) = doc else {
        return (HashMap::new(), Vec::new());
    };

    let includes = extract_string_or_list(map.get("include"));

    if let Some(Value::Object(vars)) = map.get("variables") {
        let vars = vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        return (vars, includes);
    }

    let vars = map
        .iter()
        .filter(|(k, _)| k.as_str() != "include")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (vars, includes)
}

fn extract_string_or_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn bare_mapping_treats_keys_as_variables() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "vars.yaml", "host: https://api.example.com\nuser: alice\n");
        let vars = load_includes(&["vars.yaml".to_string()], dir.path()).unwrap();
        assert_eq!(vars.get("host").unwrap(), "https://api.example.com");
        assert_eq!(vars.get("user").unwrap(), "alice");
    }

    #[test]
    fn explicit_variables_and_include_sections() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "base.yaml", "host: https://base.example.com\n");
        write(
            &dir,
            "top.yaml",
            "include: base.yaml\nvariables:\n  host: https://override.example.com\n  extra: 1\n",
        );
        let vars = load_includes(&["top.yaml".to_string()], dir.path()).unwrap();
        assert_eq!(vars.get("host").unwrap(), "https://override.example.com");
        assert_eq!(vars.get("extra").unwrap(), 1);
    }

    #[test]
    fn detects_circular_include() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "a.yaml", "include: b.yaml\nfoo: 1\n");
        write(&dir, "b.yaml", "include: a.yaml\nbar: 2\n");
        let err = load_includes(&["a.yaml".to_string()], dir.path()).unwrap_err();
        assert!(matches!(err, IncludeError::CircularInclude(_)));
    }

    #[test]
    fn missing_include_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_includes(&["missing.yaml".to_string()], dir.path()).unwrap_err();
        assert!(matches!(err, IncludeError::NotFound(_)));
    }
}
