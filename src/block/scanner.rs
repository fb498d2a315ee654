//! Fenced YAML block scanner.
//!
//! Recognises ` ```yaml ` as an opening fence and ` ``` ` as the matching
//! close, both matched after trimming surrounding whitespace.
//! Any other fenced code block (` ```json `, ` ```bash `, plain ` ``` `...)
//! is ignored outright — only the `yaml` tag starts a block.

use crate::error::RestyError;
use std::path::Path;

/// One raw fenced block: its 1-based starting line and verbatim content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Line number of the opening fence (1-based), used for error context
    /// and `TestResult` source attribution.
    pub start_line: usize,
    pub content: String,
}

/// Scans `text` for ` ```yaml `...` ``` ` fences, returning one [`RawBlock`]
/// per fence in document order. Empty blocks (whitespace-only content) are
/// skipped. An opening fence with no matching close fails with
/// [`RestyError::UnclosedBlock`].
pub fn scan(text: &str, file: &Path) -> Result<Vec<RawBlock>, RestyError> {
    let mut blocks = Vec::new();
    let mut lines = text.lines().enumerate().peekable();

    while let Some((idx, line)) = lines.next() {
        if line.trim() != "```yaml" {
            continue;
        }
        let start_line = idx + 1;
        let mut collected = Vec::new();
        let mut closed = false;

        for (_, inner_line) in lines.by_ref() {
            if inner_line.trim() == "```" {
                closed = true;
                break;
            }
            collected.push(inner_line.trim_end_matches('\r'));
        }

        if !closed {
            return Err(RestyError::UnclosedBlock {
                file: file.to_path_buf(),
                line: start_line,
            });
        }

        let content = collected.join("\n");
        if content.trim().is_empty() {
            continue;
        }
        blocks.push(RawBlock { start_line, content });
    }

    Ok(blocks)
}
