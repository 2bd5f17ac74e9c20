//! Inline script-metadata parser (C2).
//!
//! Extracts a PEP 723-style comment block from a script's source text:
//!
//! ```text
//! # /// script
//! # dependencies = ["requests"]
//! # requires-python = ">=3.10"
//! # ///
//! ```
use serde::Deserialize;

use crate::error::ConfigError;

const BLOCK_START: &str = "# /// script";
const BLOCK_END: &str = "# ///";

/// Dependency manifest embedded in a script's leading comment block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlineMetadata {
    /// Package specifiers the script requires.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Interpreter version specifier the script requires.
    #[serde(default, rename = "requires-python")]
    pub requires_python: Option<String>,
}

/// Parse the first inline metadata block found in `source`.
///
/// Returns [`InlineMetadata::default`] (no dependencies, no
/// `requires-python`) if no block is present — this is not an error, since
/// most scripts don't carry one.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedMetadata`] if a block is opened but its
/// body does not parse as a small TOML-like key-value document, identifying
/// the offending line within the block.
pub fn parse(source: &str) -> Result<InlineMetadata, ConfigError> {
    let Some(block) = extract_block(source) else {
        return Ok(InlineMetadata::default());
    };
    toml::from_str(&block.body).map_err(|e| ConfigError::MalformedMetadata {
        line: block.start_line,
        message: e.message().to_string(),
    })
}

/// A located, unwrapped metadata block.
struct Block {
    /// The comment-stripped body, ready to be parsed as TOML.
    body: String,
    /// 1-indexed source line of the opening `# /// script` delimiter.
    start_line: usize,
}

/// Locate the first `# /// script` ... `# ///` block and strip the leading
/// `# ` (or bare `#`) prefix from each interior line.
fn extract_block(source: &str) -> Option<Block> {
    let lines: Vec<&str> = source.lines().collect();
    let start_idx = lines.iter().position(|l| l.trim_end() == BLOCK_START)?;
    let end_idx = lines
        .iter()
        .skip(start_idx + 1)
        .position(|l| l.trim_end() == BLOCK_END)
        .map(|offset| start_idx + 1 + offset)?;

    let body = lines[start_idx + 1..end_idx]
        .iter()
        .map(|line| {
            line.strip_prefix("# ")
                .or_else(|| line.strip_prefix('#'))
                .unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(Block {
        body,
        start_line: start_idx + 1,
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_block() {
        let source = "#!/usr/bin/env python\n\
                       # /// script\n\
                       # dependencies = [\"requests\", \"rich\"]\n\
                       # requires-python = \">=3.10\"\n\
                       # ///\n\
                       import requests\n";
        let meta = parse(source).unwrap();
        assert_eq!(meta.dependencies, vec!["requests", "rich"]);
        assert_eq!(meta.requires_python.as_deref(), Some(">=3.10"));
    }

    #[test]
    fn parse_no_block_returns_default() {
        let source = "import requests\nprint('hi')\n";
        let meta = parse(source).unwrap();
        assert!(meta.dependencies.is_empty());
        assert!(meta.requires_python.is_none());
    }

    #[test]
    fn parse_block_missing_terminator_treated_as_absent() {
        let source = "# /// script\n# dependencies = [\"requests\"]\n";
        let meta = parse(source).unwrap();
        assert!(meta.dependencies.is_empty());
    }

    #[test]
    fn parse_dependencies_only() {
        let source = "# /// script\n# dependencies = [\"click\"]\n# ///\n";
        let meta = parse(source).unwrap();
        assert_eq!(meta.dependencies, vec!["click"]);
        assert!(meta.requires_python.is_none());
    }

    #[test]
    fn parse_malformed_block_reports_line() {
        let source = "# /// script\n# dependencies = [not valid toml\n# ///\n";
        let err = parse(source).unwrap_err();
        match err {
            ConfigError::MalformedMetadata { line, .. } => assert_eq!(line, 1),
            other => panic!("expected MalformedMetadata, got {other:?}"),
        }
    }

    #[test]
    fn parse_ignores_second_block() {
        let source = "# /// script\n# dependencies = [\"a\"]\n# ///\n\
                       # /// script\n# dependencies = [\"b\"]\n# ///\n";
        let meta = parse(source).unwrap();
        assert_eq!(meta.dependencies, vec!["a"]);
    }

    #[test]
    fn parse_unknown_key_is_rejected() {
        let source = "# /// script\n# bogus = true\n# ///\n";
        assert!(parse(source).is_err());
    }
}
