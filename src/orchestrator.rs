//! Suite orchestrator.
//!
//! ```text
//!   File text                                      VariableStore
//!       │                                                 │
//!       │ block::parse_file                                │ included / file / captured
//!       ▼                                                 │
//!  Vec<LocatedBlock> ──split──► Config blocks   Test blocks
//!       │                           │               │
//!       │                config::load_includes       │
//!       │                           │               │
//!       │                cross-file .rest includes  │
//!       │                           │               │
//!       │                           ▼               ▼
//!       │                    dependency prefix   resolver::resolve_order
//!       │                                              │
//!       │                                   topological Vec<ResolvedTest>
//!       │                                              │
//!       └──────────────────────────► walk, one at a time ◄┘
//!                                              │
//!                                    executor::Executor
//!                                              │
//!                                        Vec<TestResult> ──► TestRunSummary
//! ```
//!
//! [`run_file`] implements a six-step per-file algorithm;
//! [`Orchestrator::run`] drives it across every discovered file and
//! aggregates into a [`TestRunSummary`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{info, warn};

use crate::block::{self, Block, ConfigBlock, FileMockDefinition, TestBlock};
use crate::config;
use crate::error::RestyError;
use crate::executor::{Executor, ExecutorOptions};
use crate::mock;
use crate::resolver;
use crate::result::{TestResult, TestRunSummary, TestStatus};
use crate::vars::VariableStore;

/// Per-run selection and execution options, assembled by the CLI from
/// parsed `clap` args.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// `-t/--test`: run exactly these test names (within each file).
    pub selected_tests: Vec<String>,
    /// `-f/--filter`: run tests whose name contains the pattern (ci).
    pub filters: Vec<String>,
    /// `--dry-run`: parse and validate only, never execute.
    pub dry_run: bool,
    pub executor: ExecutorOptions,
    pub cancel: Arc<AtomicBool>,
}

impl RunOptions {
    fn wants_selection(&self) -> bool {
        !self.selected_tests.is_empty() || !self.filters.is_empty()
    }
}

fn synthetic_failure(path: &Path, message: impl Into<String>) -> TestResult {
    let mut result = TestResult::not_run("(file)", &path.to_path_buf(), 0);
    result.status = TestStatus::Failed;
    result.error = Some(message.into());
    result
}

fn is_yaml_include(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".yaml") || lower.ends_with(".yml")
}

fn is_test_file_include(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".rest") || lower.ends_with(".resty")
}

fn resolve_path(base_dir: &Path, rel: &str) -> PathBuf {
    let p = Path::new(rel);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

/// One cross-file test block plus the file it was actually declared in, for
/// result attribution and mock-sequence scoping.
struct CrossFileBlocks {
    configs: Vec<ConfigBlock>,
    tests: Vec<(PathBuf, usize, TestBlock)>,
}

/// Recursively parses a `.rest`/`.resty` file pulled in via `include:`,
/// collecting its own blocks and, in turn, whatever it includes. A load
/// failure is a warning, not a hard error (DESIGN.md Open Question 1): the
/// orchestrator does not special-case a `requires` name that only would have
/// existed had this load succeeded — an unresolved reference to it still
/// surfaces as the ordinary `MissingDependency` from the resolver.
fn load_cross_file(path: &Path, visited: &mut HashSet<PathBuf>) -> CrossFileBlocks {
    let mut out = CrossFileBlocks {
        configs: Vec::new(),
        tests: Vec::new(),
    };

    if !visited.insert(path.to_path_buf()) {
        return out;
    }

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "failed to load included test file");
            return out;
        }
    };

    let located = match block::parse_file(&text, path) {
        Ok(b) => b,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "failed to parse included test file");
            return out;
        }
    };

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for lb in located {
        match lb.block {
            Block::Config(c) => {
                for inc in &c.include {
                    if is_test_file_include(inc) {
                        let nested_path = resolve_path(&base_dir, inc);
                        let nested = load_cross_file(&nested_path, visited);
                        out.configs.extend(nested.configs);
                        out.tests.extend(nested.tests);
                    }
                }
                out.configs.push(c);
            }
            Block::Test(t) => out.tests.push((path.to_path_buf(), lb.line, t)),
        }
    }

    out
}

fn matches_filter(name: &str, filters: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    filters
        .iter()
        .any(|f| lower.contains(&f.to_ascii_lowercase()))
}

/// Runs every test block in one `.resty`/`.rest` file.
///
/// `Ok` always carries a (possibly empty, possibly synthetic-failure)
/// result list; only the two dependency-graph failures that abort the
/// file's run are surfaced as `Err` — missing- and circular-dependency
/// errors stop processing for the affected file only.
pub async fn run_file(path: &Path, options: &RunOptions) -> Result<Vec<TestResult>, RestyError> {
    info!(file = %path.display(), "running file");

    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => return Ok(vec![synthetic_failure(path, format!("failed to read file: {e}"))]),
    };

    let located = match block::parse_file(&text, path) {
        Ok(b) => b,
        Err(e) => return Ok(vec![synthetic_failure(path, e.to_string())]),
    };

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut own_configs: Vec<ConfigBlock> = Vec::new();
    let mut own_tests: Vec<(usize, TestBlock)> = Vec::new();
    for lb in located {
        match lb.block {
            Block::Config(c) => own_configs.push(c),
            Block::Test(t) => own_tests.push((lb.line, t)),
        }
    }

    // Step 2: load `.yaml`/`.yml` includes into the `included` layer.
    let yaml_includes: Vec<String> = own_configs
        .iter()
        .flat_map(|c| c.include.iter().cloned())
        .filter(|inc| is_yaml_include(inc))
        .collect();

    let mut vars = VariableStore::new();
    match config::load_includes(&yaml_includes, &base_dir) {
        Ok(map) => vars.set_included(map),
        Err(config::IncludeError::CircularInclude(cycle)) => {
            let message = RestyError::CircularInclude(
                cycle.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" -> "),
            )
            .to_string();
            return Ok(vec![synthetic_failure(path, message)]);
        }
        Err(config::IncludeError::NotFound(missing)) => {
            let message = RestyError::IncludeFileNotFound(missing).to_string();
            return Ok(vec![synthetic_failure(path, message)]);
        }
        Err(e) => return Ok(vec![synthetic_failure(path, format!("include error: {e}"))]),
    }

    // Step 3: pull in cross-file `.rest`/`.resty` includes.
    let mut visited = HashSet::new();
    visited.insert(path.to_path_buf());
    let mut all_configs = own_configs.clone();
    let mut all_tests: Vec<(PathBuf, usize, TestBlock)> = own_tests
        .iter()
        .map(|(line, t)| (path.to_path_buf(), *line, t.clone()))
        .collect();

    for c in &own_configs {
        for inc in &c.include {
            if is_test_file_include(inc) {
                let inc_path = resolve_path(&base_dir, inc);
                let cross = load_cross_file(&inc_path, &mut visited);
                all_configs.extend(cross.configs);
                all_tests.extend(cross.tests);
            }
        }
    }

    // Config-level `dependencies:` becomes a universal `requires` prefix for
    // every test declared directly in this file (DESIGN.md Open Question 2).
    let dependency_prefix: Vec<String> = own_configs
        .iter()
        .flat_map(|c| c.dependencies.iter().cloned())
        .collect();
    if !dependency_prefix.is_empty() {
        for (origin, _, test) in &mut all_tests {
            if origin.as_path() == path {
                let mut requires = dependency_prefix.clone();
                requires.extend(test.requires.iter().cloned());
                requires.dedup();
                test.requires = requires;
            }
        }
    }

    let origin_by_name: HashMap<String, (PathBuf, usize)> = all_tests
        .iter()
        .map(|(origin, line, t)| (t.name.clone(), (origin.clone(), *line)))
        .collect();
    let tests_only: Vec<TestBlock> = all_tests.iter().map(|(_, _, t)| t.clone()).collect();

    // Step 4: selection is always restricted to this file's own tests,
    // narrowed further by `-t`/`-f` if given.
    let own_names: Vec<String> = own_tests.iter().map(|(_, t)| t.name.clone()).collect();
    let selection: Vec<String> = if options.wants_selection() {
        own_names
            .iter()
            .filter(|n| {
                options.selected_tests.iter().any(|s| s == *n)
                    || matches_filter(n, &options.filters)
            })
            .cloned()
            .collect()
    } else {
        own_names
    };

    let resolved = resolver::resolve_order(&tests_only, &[], Some(&selection))?;

    // All Config blocks' variables merge into the file layer before any
    // test runs, preserving document order (own file first, then includes).
    for c in &all_configs {
        vars.update_file(c.variables.clone());
    }

    let external_mocks: Vec<FileMockDefinition> = all_configs
        .iter()
        .flat_map(|c| c.mocks_files.iter())
        .filter_map(|path_str| match mock::load_external_file(path_str, &base_dir) {
            Ok(defs) => Some(defs),
            Err(e) => {
                warn!(file = %path_str, error = %e, "failed to load external mock file");
                None
            }
        })
        .flatten()
        .collect();
    let inline_mocks: Vec<FileMockDefinition> =
        all_configs.iter().flat_map(|c| c.mocks.iter().cloned()).collect();

    let mut executor = Executor::new(
        external_mocks,
        inline_mocks,
        options.executor.clone(),
        options.cancel.clone(),
    );

    if options.dry_run {
        return Ok(resolved
            .into_iter()
            .map(|r| {
                let (origin, line) = origin_by_name
                    .get(&r.test.name)
                    .cloned()
                    .unwrap_or_else(|| (path.to_path_buf(), 0));
                TestResult::not_run(&r.test.name, &origin, line)
            })
            .collect());
    }

    // Step 5: walk the resolved order, updating captured variables strictly
    // between test executions.
    let mut results = Vec::with_capacity(resolved.len());
    for r in resolved {
        let (origin, line) = origin_by_name
            .get(&r.test.name)
            .cloned()
            .unwrap_or_else(|| (path.to_path_buf(), 0));

        if r.test.disabled {
            results.push(TestResult::skipped(&r.test.name, &origin, line, "Test is disabled"));
            continue;
        }

        let (result, extracted) = executor.execute(r.test, &origin, line, &vars).await;
        if result.passed() {
            vars.set_captured(extracted);
        }
        results.push(result);
    }

    Ok(results)
}

/// Drives [`run_file`] across a set of discovered files and aggregates the
/// result into a [`TestRunSummary`].
pub struct Orchestrator {
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Runs every file in sequence. Files are independent, but the
    /// CLI binary drives them one at a time for now — `tokio::try_join!`/
    /// `join_all` across files is a valid outer-driver extension the core
    /// doesn't rule out, just doesn't require.
    ///
    /// A `MissingDependency`/`CircularDependency` (or any other `RestyError`)
    /// raised while resolving one file stops processing for *that file only*:
    /// it is recorded as a single synthetic failed result
    /// carrying the error's message, and the run continues to the next file.
    /// [`TestRunSummary::exit_code`] only reasons about pass/fail counts, so
    /// the highest-severity typed error seen across all files is tracked
    /// separately and returned in [`RunOutcome::worst_error`] for the caller
    /// (`main.rs`) to fold into the final process exit code.
    pub async fn run(&self, files: &[PathBuf]) -> RunOutcome {
        let mut summary = TestRunSummary::new();
        let mut worst_error: Option<RestyError> = None;
        for file in files {
            let results = match run_file(file, &self.options).await {
                Ok(results) => results,
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "file processing stopped");
                    let failure = synthetic_failure(file, err.to_string());
                    let keep = match &worst_error {
                        Some(existing) => err.exit_code() > existing.exit_code(),
                        None => true,
                    };
                    if keep {
                        worst_error = Some(err);
                    }
                    vec![failure]
                }
            };
            summary.push_file(file.clone(), results);
        }
        RunOutcome { summary, worst_error }
    }
}

/// Result of driving [`Orchestrator::run`] across every discovered file.
///
/// `worst_error` is `Some` when at least one file was aborted by a typed
/// `RestyError` rather than running to completion; its `exit_code()` takes
/// priority over [`TestRunSummary::exit_code`].
pub struct RunOutcome {
    pub summary: TestRunSummary,
    pub worst_error: Option<RestyError>,
}

impl RunOutcome {
    /// Process exit code for the whole run: the worst typed error if one
    /// occurred, else the plain pass/fail code from the summary.
    pub fn exit_code(&self) -> i32 {
        match &self.worst_error {
            Some(err) => err.exit_code(),
            None => self.summary.exit_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn variable_substitution_and_json_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "login.resty",
            r#"
```yaml
variables:
  host: https://api.example.com
  username: testuser
```

```yaml
test: login
post: $host/api/login
body:
  username: $username
  password: secret
extract:
  user_id: $.id
  auth_token: $.token
mock:
  status: 200
  body:
    id: 123
    token: abc123
    status: success
```
"#,
        );

        let options = RunOptions::default();
        let results = run_file(&path, &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, TestStatus::Passed);
        assert_eq!(results[0].extracted.get("user_id").unwrap(), &serde_json::json!(123));
        assert_eq!(
            results[0].extracted.get("auth_token").unwrap(),
            &serde_json::json!("abc123")
        );
        assert_eq!(
            results[0].request.url.as_deref(),
            Some("https://api.example.com/api/login")
        );
    }

    #[tokio::test]
    async fn disabled_test_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "skip.resty",
            r#"
```yaml
test: skipped_one
get: https://example.invalid/x
disabled: true
```
"#,
        );

        let options = RunOptions::default();
        let results = run_file(&path, &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, TestStatus::Skipped);
    }

    #[tokio::test]
    async fn selection_runs_only_transitive_closure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "chain.resty",
            r#"
```yaml
test: login
post: https://example.invalid/login
mock:
  status: 200
  body: {}
```

```yaml
test: get_profile
requires: login
get: https://example.invalid/profile
mock:
  status: 200
  body: {}
```

```yaml
test: update_profile
requires: get_profile
put: https://example.invalid/profile
mock:
  status: 200
  body: {}
```

```yaml
test: unrelated
get: https://example.invalid/unrelated
mock:
  status: 200
  body: {}
```
"#,
        );

        let options = RunOptions {
            selected_tests: vec!["update_profile".to_string()],
            ..Default::default()
        };
        let results = run_file(&path, &options).await.unwrap();
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["login", "get_profile", "update_profile"]);
    }

    #[tokio::test]
    async fn dry_run_never_executes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "dry.resty",
            r#"
```yaml
test: would_run
get: https://example.invalid/x
```
"#,
        );

        let options = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let results = run_file(&path, &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, TestStatus::NotRun);
    }

    #[tokio::test]
    async fn a_circular_dependency_in_one_file_does_not_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write_file(
            &dir,
            "broken.resty",
            r#"
```yaml
test: a
requires: b
get: https://example.invalid/a
mock:
  status: 200
  body: {}
```

```yaml
test: b
requires: a
get: https://example.invalid/b
mock:
  status: 200
  body: {}
```
"#,
        );
        let healthy = write_file(
            &dir,
            "healthy.resty",
            r#"
```yaml
test: ok
get: https://example.invalid/ok
mock:
  status: 200
  body: {}
```
"#,
        );

        let orchestrator = Orchestrator::new(RunOptions::default());
        let outcome = orchestrator.run(&[broken, healthy]).await;

        assert_eq!(outcome.summary.files.len(), 2);
        assert_eq!(outcome.exit_code(), 4);
        assert_eq!(outcome.summary.files[0].results.len(), 1);
        assert_eq!(outcome.summary.files[0].results[0].status, TestStatus::Failed);
        assert_eq!(outcome.summary.files[1].results.len(), 1);
        assert_eq!(outcome.summary.files[1].results[0].status, TestStatus::Passed);
    }

    #[tokio::test]
    async fn a_circular_yaml_include_surfaces_as_a_synthetic_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir, "a.yaml", "include: b.yaml\nfoo: 1\n");
        write_file(&dir, "b.yaml", "include: a.yaml\nbar: 2\n");
        let path = write_file(
            &dir,
            "suite.resty",
            r#"
```yaml
include:
  - a.yaml
```

```yaml
test: t
get: https://example.invalid/t
mock:
  status: 200
  body: {}
```
"#,
        );

        let options = RunOptions::default();
        let results = run_file(&path, &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, TestStatus::Failed);
        assert!(results[0].error.as_deref().unwrap().contains("circular include"));
    }

    #[tokio::test]
    async fn a_missing_yaml_include_surfaces_as_a_synthetic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "suite.resty",
            r#"
```yaml
include:
  - missing.yaml
```

```yaml
test: t
get: https://example.invalid/t
mock:
  status: 200
  body: {}
```
"#,
        );

        let options = RunOptions::default();
        let results = run_file(&path, &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, TestStatus::Failed);
        assert!(results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("include file not found"));
    }
}
