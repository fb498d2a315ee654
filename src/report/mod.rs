//! Output formatters plus a live console reporter.
//!
//! Each format is a standalone `render` function taking `&TestRunSummary`
//! and returning a `String`, leaving the core free of any formatting
//! concerns of its own.

pub mod console;
pub mod html;
pub mod json;
pub mod junit;
pub mod markdown;
pub mod text;

use std::str::FromStr;

use crate::result::TestRunSummary;

/// `-o/--output` format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Markdown,
    Json,
    Xml,
    Html,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "xml" | "junit" => Ok(OutputFormat::Xml),
            "html" => Ok(OutputFormat::Html),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Renders `summary` in the requested format.
pub fn render(format: OutputFormat, summary: &TestRunSummary) -> String {
    match format {
        OutputFormat::Text => text::render(summary),
        OutputFormat::Markdown => markdown::render(summary),
        OutputFormat::Json => json::render(summary),
        OutputFormat::Xml => junit::render(summary),
        OutputFormat::Html => html::render(summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_format_names() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("xml".parse::<OutputFormat>().unwrap(), OutputFormat::Xml);
        assert!("bogus".parse::<OutputFormat>().is_err());
    }
}
