//! Env-file parser (C3): `KEY=VALUE` files with `$VAR`/`${VAR}` expansion.
use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;

/// Parse an env file from disk.
///
/// Missing files parse as an empty map — callers decide whether a missing
/// `env_files` entry is itself an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read, or
/// [`ConfigError::MalformedEnvFile`] if a non-blank, non-comment line is not
/// a valid `KEY=VALUE` pair.
pub fn parse_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&content, &path.display().to_string())
}

/// Parse env-file content from a string, expanding `$VAR`/`${VAR}` against
/// the current process environment as it exists at the moment of the call.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedEnvFile`] if a non-blank, non-comment
/// line is not a valid `KEY=VALUE` pair.
pub fn parse_str(content: &str, path: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut map = HashMap::new();
    for (idx, raw_line) in content.lines().enumerate() {
        let line = strip_comment(raw_line.trim());
        if line.is_empty() {
            continue;
        }
        let Some((key, raw_value)) = line.split_once('=') else {
            return Err(ConfigError::MalformedEnvFile {
                path: path.to_string(),
                line: idx + 1,
                message: format!("expected KEY=VALUE, got '{line}'"),
            });
        };
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::MalformedEnvFile {
                path: path.to_string(),
                line: idx + 1,
                message: format!("invalid variable name '{key}'"),
            });
        }
        let value = resolve_value(raw_value.trim());
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Strip a `#`-led comment. A `#` only starts a comment at the beginning of
/// the line or when preceded by whitespace, so `#` inside an unquoted value
/// without leading space is preserved.
fn strip_comment(line: &str) -> &str {
    if line.starts_with('#') {
        return "";
    }
    line.find(" #")
        .or_else(|| line.find('\t').filter(|&i| line[i..].starts_with("\t#")))
        .map_or(line, |idx| line[..idx].trim_end())
}

/// Resolve quoting and variable expansion for a single value.
///
/// Single-quoted values are literal. Double-quoted and unquoted values have
/// their surrounding quotes stripped (if any) and undergo `$VAR`/`${VAR}`
/// expansion against the process environment.
fn resolve_value(raw: &str) -> String {
    if let Some(inner) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return inner.to_string();
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    expand_vars(unquoted)
}

/// Expand `$VAR` and `${VAR}` references against the process environment.
/// Undefined references expand to the empty string.
fn expand_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        if input[i + 1..].starts_with('{') {
            let rest = &input[i + 2..];
            if let Some(end) = rest.find('}') {
                let name = &rest[..end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                for _ in 0..name.len() + 2 {
                    chars.next();
                }
                continue;
            }
        }
        let rest = &input[i + 1..];
        let name_len = rest
            .char_indices()
            .take_while(|&(_, c)| c.is_ascii_alphanumeric() || c == '_')
            .count();
        if name_len == 0 {
            out.push('$');
            continue;
        }
        let name = &rest[..name_len];
        out.push_str(&std::env::var(name).unwrap_or_default());
        for _ in 0..name_len {
            chars.next();
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn parse_simple_pairs() {
        let map = parse_str("A=1\nB=2\n", "test").unwrap();
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "2");
    }

    #[test]
    fn parse_skips_comments_and_blanks() {
        let map = parse_str("# comment\n\nA=1\n  # indented comment\n", "test").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["A"], "1");
    }

    #[test]
    fn parse_strips_inline_comment() {
        let map = parse_str("A=1 # trailing\n", "test").unwrap();
        assert_eq!(map["A"], "1");
    }

    #[test]
    fn parse_double_quoted_value_strips_quotes() {
        let map = parse_str(r#"A="hello world""#, "test").unwrap();
        assert_eq!(map["A"], "hello world");
    }

    #[test]
    fn parse_single_quoted_value_is_literal() {
        let map = parse_str("A='$HOME literal'", "test").unwrap();
        assert_eq!(map["A"], "$HOME literal");
    }

    #[test]
    #[allow(unsafe_code)]
    fn parse_expands_unquoted_var() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        unsafe {
            std::env::set_var("PT_ENV_FILE_TEST_VAR", "expanded");
        }
        let map = parse_str("A=$PT_ENV_FILE_TEST_VAR\n", "test").unwrap();
        unsafe {
            std::env::remove_var("PT_ENV_FILE_TEST_VAR");
        }
        assert_eq!(map["A"], "expanded");
    }

    #[test]
    #[allow(unsafe_code)]
    fn parse_expands_braced_var() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        unsafe {
            std::env::set_var("PT_ENV_FILE_TEST_VAR2", "braced");
        }
        let map = parse_str(r#"A="prefix-${PT_ENV_FILE_TEST_VAR2}-suffix""#, "test").unwrap();
        unsafe {
            std::env::remove_var("PT_ENV_FILE_TEST_VAR2");
        }
        assert_eq!(map["A"], "prefix-braced-suffix");
    }

    #[test]
    fn parse_undefined_var_expands_to_empty() {
        let map = parse_str("A=$PT_ENV_FILE_DEFINITELY_UNSET\n", "test").unwrap();
        assert_eq!(map["A"], "");
    }

    #[test]
    fn parse_invalid_line_reports_line_number() {
        let err = parse_str("A=1\nnotakeyvalue\n", "env.test").unwrap_err();
        match err {
            ConfigError::MalformedEnvFile { line, path, .. } => {
                assert_eq!(line, 2);
                assert_eq!(path, "env.test");
            }
            other => panic!("expected MalformedEnvFile, got {other:?}"),
        }
    }

    #[test]
    fn parse_invalid_key_name_rejected() {
        assert!(parse_str("1BAD=x\n", "test").is_err());
        assert!(parse_str("HAS SPACE=x\n", "test").is_err());
    }

    #[test]
    fn parse_missing_file_returns_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let map = parse_file(&dir.path().join("nope.env")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn parse_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.env");
        std::fs::write(&path, "FOO=bar\nBAZ=qux\n").unwrap();
        let map = parse_file(&path).unwrap();
        assert_eq!(map["FOO"], "bar");
        assert_eq!(map["BAZ"], "qux");
    }

    #[test]
    fn parse_hash_without_leading_space_is_literal() {
        let map = parse_str("A=color#FF0000\n", "test").unwrap();
        assert_eq!(map["A"], "color#FF0000");
    }
}
