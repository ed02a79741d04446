pub mod console;
pub mod json;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::report::ProofReport;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Some(Self::Console),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Render check results in the requested format.
pub fn render(reports: &[ProofReport], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render(reports)),
        OutputFormat::Json => json::render(reports),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_format_names() {
        assert_eq!(OutputFormat::from_str_lenient("TEXT"), Some(OutputFormat::Console));
        assert_eq!(OutputFormat::from_str_lenient("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str_lenient("sarif"), None);
    }
}
