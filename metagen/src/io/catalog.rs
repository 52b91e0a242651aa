//! Benchmark catalog loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::core::types::ProblemSpec;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    problems: Vec<ProblemSpec>,
}

/// Parse a catalog document (`{"problems": [...]}`).
pub fn parse_catalog(contents: &str) -> Result<Vec<ProblemSpec>> {
    let file: CatalogFile = serde_json::from_str(contents).context("parse problem catalog")?;
    Ok(file.problems)
}

/// Read the catalog file. A missing or malformed catalog is an error.
pub fn load_catalog(path: &Path) -> Result<Vec<ProblemSpec>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let problems = parse_catalog(&contents).with_context(|| format!("load {}", path.display()))?;
    debug!(path = %path.display(), problems = problems.len(), "loaded catalog");
    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_problems_with_tests() {
        let contents = json!({
            "problems": [{
                "id": "9",
                "title": "isPalindrome",
                "description": "Return true if x reads the same backwards.",
                "function_signature": "def isPalindrome(x: int) -> bool:",
                "tests": [
                    {"input": [121], "expected": true},
                    {"input": [-121], "expected": false}
                ]
            }, {
                "id": "0",
                "title": "empty",
                "function_signature": "def f():"
            }]
        })
        .to_string();
        let problems = parse_catalog(&contents).expect("parse");
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].tests.len(), 2);
        assert_eq!(problems[0].tests[1].expected, json!(false));
        assert!(problems[1].tests.is_empty());
        assert!(problems[1].description.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(load_catalog(&temp.path().join("none.json")).is_err());
    }
}
