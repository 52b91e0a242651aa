//! Syntactic discovery of the callable entry point in a solution fragment.

use anyhow::{Context, Result, bail};
use regex::Regex;

/// Default pattern: first Python `def name(` (optionally `async def`).
pub const PYTHON_FUNCTION_PATTERN: &str = r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(";

/// Finds the first function definition in source text.
#[derive(Debug, Clone)]
pub struct FunctionScanner {
    pattern: Regex,
}

impl FunctionScanner {
    /// Build a scanner from a regex whose first capture group is the function name.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern =
            Regex::new(pattern).with_context(|| format!("compile function pattern {pattern}"))?;
        if pattern.captures_len() < 2 {
            bail!("function pattern must contain a capture group for the name");
        }
        Ok(Self { pattern })
    }

    pub fn first_function(&self, source: &str) -> Option<String> {
        self.pattern
            .captures(source)
            .and_then(|caps| caps.get(1))
            .map(|name| name.as_str().to_string())
    }
}

/// Remove a surrounding markdown code fence (```lang ... ```), if present.
///
/// Model-authored solutions often arrive fenced. Text outside the first fenced
/// block is discarded; unfenced input is returned trimmed.
pub fn strip_code_fences(source: &str) -> String {
    let trimmed = source.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_open = &trimmed[start + 3..];
    let body_start = after_open.find('\n').map(|idx| idx + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim_end().to_string(),
        None => body.trim_end().to_string(),
    }
}
