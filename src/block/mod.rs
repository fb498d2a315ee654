//! Markdown/YAML block extraction.
//!
//! ```text
//! Markdown text ──► scanner::scan ──► Vec<RawBlock> ──► decode::decode ──► Block
//! ```
//!
//! [`parse_file`] ties the scanner and decoder together and is what
//! [`crate::orchestrator`] calls for every `.resty`/`.rest` file.

pub mod decode;
pub mod model;
pub mod scanner;

pub use decode::DecodeError;
pub use model::{
    Block, Body, ConfigBlock, ExpectDefinition, FileMockDefinition, Headers,
    InlineMockDefinition, Method, MockResponse, TestBlock, ValueExpectation,
};

use std::path::Path;

use crate::error::RestyError;

/// One decoded block plus the 1-based source line it started on.
#[derive(Debug, Clone)]
pub struct LocatedBlock {
    pub line: usize,
    pub block: Block,
}

/// Scans and decodes every fenced YAML block in `text`, in document order.
pub fn parse_file(text: &str, file: &Path) -> Result<Vec<LocatedBlock>, RestyError> {
    let raw_blocks = scanner::scan(text, file)?;
    let mut out = Vec::with_capacity(raw_blocks.len());
    for raw in raw_blocks {
        let block = decode::decode(&raw.content, file).map_err(|e| {
            let message = e.to_string();
            // `Invalid` covers block invariant violations (e.g. `mock_only`
            // without an inline mock or method+url), not malformed YAML.
            match e {
                DecodeError::Invalid(_) => RestyError::InvalidTest {
                    file: file.to_path_buf(),
                    line: raw.start_line,
                    message,
                },
                DecodeError::Yaml(_) => RestyError::YamlDecodeError {
                    file: file.to_path_buf(),
                    line: raw.start_line,
                    message,
                },
            }
        })?;
        out.push(LocatedBlock {
            line: raw.start_line,
            block,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_mixed_config_and_test_blocks() {
        let text = r#"
# Suite

```yaml
variables:
  host: https://api.example.com
```

```yaml
test: login
post: $host/api/login
```
"#;
        let blocks = parse_file(text, &PathBuf::from("suite.resty")).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[0].block, Block::Config(_)));
        assert!(matches!(blocks[1].block, Block::Test(_)));
    }

    #[test]
    fn a_block_invariant_violation_is_reported_as_invalid_test() {
        let text = "```yaml\ntest: only_mock\nmock_only: true\n```\n";
        let err = parse_file(text, &PathBuf::from("suite.resty")).unwrap_err();
        assert!(matches!(err, RestyError::InvalidTest { .. }));
    }

    #[test]
    fn malformed_yaml_is_reported_as_a_decode_error() {
        let text = "```yaml\ntest: [unterminated\n```\n";
        let err = parse_file(text, &PathBuf::from("suite.resty")).unwrap_err();
        assert!(matches!(err, RestyError::YamlDecodeError { .. }));
    }
}
