//! Dependency resolution and ordering.
//!
//! A file's `requires` graph (per-test, plus an implicit prefix contributed
//! by `Config.dependencies`) must be validated and linearized
//! before execution: every named dependency must exist, the graph must be
//! acyclic, and the final run order must respect every edge while otherwise
//! preserving document order (a stable topological sort, not an arbitrary
//! one — reruns of the same file should execute tests in the same order).

use std::collections::{HashMap, HashSet};

use crate::block::TestBlock;
use crate::error::RestyError;

/// One test plus its resolved (explicit + inherited) dependency names.
#[derive(Debug, Clone)]
pub struct ResolvedTest<'a> {
    pub test: &'a TestBlock,
    pub requires: Vec<String>,
}

/// Validates and orders a file's tests.
///
/// `dependency_prefix` is `Config.dependencies`, prepended to every test's
/// own `requires` list (Open Question 2 in DESIGN.md: Config dependencies
/// apply file-wide, not only to tests that follow the block). `selection`,
/// when present, restricts the output to the transitive closure of the
/// named tests over `requires` edges; `None` runs every test in the file.
pub fn resolve_order<'a>(
    tests: &'a [TestBlock],
    dependency_prefix: &[String],
    selection: Option<&[String]>,
) -> Result<Vec<ResolvedTest<'a>>, RestyError> {
    let names: HashSet<&str> = tests.iter().map(|t| t.name.as_str()).collect();

    let resolved: Vec<ResolvedTest<'a>> = tests
        .iter()
        .map(|t| {
            let mut requires = dependency_prefix.to_vec();
            requires.extend(t.requires.iter().cloned());
            requires.dedup();
            ResolvedTest { test: t, requires }
        })
        .collect();

    for r in &resolved {
        for dep in &r.requires {
            if !names.contains(dep.as_str()) {
                return Err(RestyError::MissingDependency(
                    r.test.name.clone(),
                    dep.clone(),
                ));
            }
        }
    }

    let index: HashMap<&str, usize> = resolved
        .iter()
        .enumerate()
        .map(|(i, r)| (r.test.name.as_str(), i))
        .collect();

    let closure = match selection {
        None => (0..resolved.len()).collect(),
        Some(selected) => transitive_closure(selected, &resolved, &index)?,
    };

    detect_cycle(&resolved, &index, &closure)?;

    let order = topological_order(&resolved, &index, &closure);
    Ok(order.into_iter().map(|i| resolved[i].clone()).collect())
}

/// Computes the set of indices reachable from `selected` over `requires`
/// edges, including the selected names themselves.
fn transitive_closure(
    selected: &[String],
    resolved: &[ResolvedTest],
    index: &HashMap<&str, usize>,
) -> Result<HashSet<usize>, RestyError> {
    let mut closure = HashSet::new();
    let mut stack: Vec<usize> = Vec::new();

    for name in selected {
        let Some(&i) = index.get(name.as_str()) else {
            return Err(RestyError::MissingDependency(
                "(selection)".to_string(),
                name.clone(),
            ));
        };
        if closure.insert(i) {
            stack.push(i);
        }
    }

    while let Some(i) = stack.pop() {
        for dep in &resolved[i].requires {
            let j = index[dep.as_str()];
            if closure.insert(j) {
                stack.push(j);
            }
        }
    }

    Ok(closure)
}

/// Grey/black DFS cycle detection over `closure`, reporting the cycle path
/// on failure.
fn detect_cycle(
    resolved: &[ResolvedTest],
    index: &HashMap<&str, usize>,
    closure: &HashSet<usize>,
) -> Result<(), RestyError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    let mut color = vec![Color::White; resolved.len()];
    let mut stack: Vec<String> = Vec::new();

    fn visit(
        i: usize,
        resolved: &[ResolvedTest],
        index: &HashMap<&str, usize>,
        closure: &HashSet<usize>,
        color: &mut [Color],
        stack: &mut Vec<String>,
    ) -> Result<(), RestyError> {
        color[i] = Color::Grey;
        stack.push(resolved[i].test.name.clone());

        for dep in &resolved[i].requires {
            let j = index[dep.as_str()];
            if !closure.contains(&j) {
                continue;
            }
            match color[j] {
                Color::White => visit(j, resolved, index, closure, color, stack)?,
                Color::Grey => {
                    let start = stack.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(dep.clone());
                    return Err(RestyError::CircularDependency(cycle));
                }
                Color::Black => {}
            }
        }

        stack.pop();
        color[i] = Color::Black;
        Ok(())
    }

    for &i in closure {
        if color[i] == Color::White {
            visit(i, resolved, index, closure, &mut color, &mut stack)?;
        }
    }
    Ok(())
}

/// Kahn's algorithm restricted to `closure`, seeded with a FIFO over document
/// order so that ties resolve to the original declaration order.
fn topological_order(
    resolved: &[ResolvedTest],
    index: &HashMap<&str, usize>,
    closure: &HashSet<usize>,
) -> Vec<usize> {
    let n = resolved.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for &i in closure {
        let r = &resolved[i];
        in_degree[i] = r.requires.len();
        for dep in &r.requires {
            dependents[index[dep.as_str()]].push(i);
        }
    }

    let mut ready: std::collections::VecDeque<usize> = (0..n)
        .filter(|i| closure.contains(i) && in_degree[*i] == 0)
        .collect();
    let mut order = Vec::with_capacity(closure.len());

    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &dependent in &dependents[i] {
            if !closure.contains(&dependent) {
                continue;
            }
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Headers, Method};

    fn test_block(name: &str, requires: &[&str]) -> TestBlock {
        TestBlock {
            name: name.to_string(),
            method: Some(Method::Get),
            url: Some("/x".to_string()),
            description: None,
            headers: Headers::default(),
            body: None,
            extract: Default::default(),
            expect: None,
            requires: requires.iter().map(|s| s.to_string()).collect(),
            disabled: false,
            retry: 0,
            timeout: None,
            mock_only: false,
            mock: None,
        }
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let tests = vec![
            test_block("login", &[]),
            test_block("create_user", &["login"]),
            test_block("delete_user", &["create_user"]),
        ];
        let order = resolve_order(&tests, &[], None).unwrap();
        let names: Vec<_> = order.iter().map(|r| r.test.name.as_str()).collect();
        assert_eq!(names, vec!["login", "create_user", "delete_user"]);
    }

    #[test]
    fn preserves_document_order_among_independent_tests() {
        let tests = vec![test_block("b", &[]), test_block("a", &[])];
        let order = resolve_order(&tests, &[], None).unwrap();
        let names: Vec<_> = order.iter().map(|r| r.test.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn missing_dependency_is_an_error() {
        let tests = vec![test_block("a", &["nonexistent"])];
        let err = resolve_order(&tests, &[], None).unwrap_err();
        assert!(matches!(err, RestyError::MissingDependency(_, _)));
    }

    #[test]
    fn cycle_is_detected() {
        let tests = vec![test_block("a", &["b"]), test_block("b", &["a"])];
        let err = resolve_order(&tests, &[], None).unwrap_err();
        assert!(matches!(err, RestyError::CircularDependency(_)));
    }

    #[test]
    fn config_dependencies_prefix_every_test() {
        let tests = vec![test_block("setup", &[]), test_block("t", &[])];
        let order = resolve_order(&tests, &["setup".to_string()], None).unwrap();
        assert_eq!(order[1].requires, vec!["setup".to_string()]);
    }

    #[test]
    fn selection_restricts_to_transitive_closure() {
        let tests = vec![
            test_block("login", &[]),
            test_block("get_profile", &["login"]),
            test_block("update_profile", &["get_profile"]),
            test_block("unrelated", &[]),
        ];
        let order = resolve_order(&tests, &[], Some(&["update_profile".to_string()])).unwrap();
        let names: Vec<_> = order.iter().map(|r| r.test.name.as_str()).collect();
        assert_eq!(names, vec!["login", "get_profile", "update_profile"]);
    }
}
