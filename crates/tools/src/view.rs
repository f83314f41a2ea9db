//! The `view` tool — read a numbered line range of a file.
//!
//! A range that exceeds the file falls back to returning the entire file
//! with an explicit marker so the model learns the real bounds.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use nextai_domain::error::{Error, Result};

use crate::registry::ItemResult;

#[derive(Debug, Deserialize)]
struct ViewItem {
    path: String,
    start: i64,
    end: i64,
}

pub(crate) async fn run(item: &Value) -> Result<ItemResult> {
    let item: ViewItem = serde_json::from_value(item.clone())
        .map_err(|e| Error::InvalidToolInput(format!("invalid view item: {e}")))?;
    let (path, start, end) = validate_range(&item.path, item.start, item.end)?;

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::InvalidToolInput(format!("cannot read {}: {e}", path.display())))?;
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();

    let in_bounds = start <= total && end <= total;

    let (numbered, marker) = if total == 0 {
        (
            String::new(),
            Some(format!("[empty] (fallback from requested [{start}-{end}], total=0)")),
        )
    } else if in_bounds {
        (number_lines(&lines[start - 1..end], start), None)
    } else {
        (
            number_lines(&lines, 1),
            Some(format!("[fallback from requested [{start}-{end}], total={total}]")),
        )
    };

    let summary = match &marker {
        Some(marker) => format!("view <{}> {marker}", item.path),
        None => format!("view <{}> [{start}-{end}]", item.path),
    };

    Ok(ItemResult {
        ok: true,
        summary,
        output: numbered.clone(),
        raw: serde_json::json!({
            "path": item.path,
            "start": start,
            "end": end,
            "total": total,
            "output": numbered,
            "fallback": marker.is_some(),
        }),
    })
}

fn number_lines(lines: &[&str], first: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}: {line}", first + i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shared path/range validation for `view` and `edit`.
pub(crate) fn validate_range(path: &str, start: i64, end: i64) -> Result<(std::path::PathBuf, usize, usize)> {
    let path = path.trim();
    if path.is_empty() || !Path::new(path).is_absolute() {
        return Err(Error::InvalidToolInput(format!(
            "tool input path must be absolute, got {path:?}"
        )));
    }
    if start < 1 {
        return Err(Error::InvalidToolInput(format!(
            "tool input start must be >= 1, got {start}"
        )));
    }
    if end < start {
        return Err(Error::InvalidToolInput(format!(
            "tool input end must be >= start, got [{start}-{end}]"
        )));
    }
    Ok((Path::new(path).to_owned(), start as usize, end as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        tokio::fs::write(&path, content).await.unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn reads_a_numbered_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = seed(&dir, "f.txt", "alpha\nbeta\ngamma\n").await;
        let result = run(&serde_json::json!({"path": path, "start": 2, "end": 3}))
            .await
            .unwrap();
        assert_eq!(result.output, "2: beta\n3: gamma");
        assert_eq!(result.summary, format!("view <{path}> [2-3]"));
        assert_eq!(result.raw["fallback"], false);
    }

    #[tokio::test]
    async fn out_of_bounds_falls_back_to_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = seed(&dir, "f.txt", "one\ntwo\n").await;
        let result = run(&serde_json::json!({"path": path, "start": 1, "end": 100}))
            .await
            .unwrap();
        assert_eq!(
            result.summary,
            format!("view <{path}> [fallback from requested [1-100], total=2]")
        );
        assert_eq!(result.output, "1: one\n2: two");
    }

    #[tokio::test]
    async fn empty_file_has_its_own_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = seed(&dir, "abs.txt", "").await;
        let result = run(&serde_json::json!({"path": path, "start": 1, "end": 100}))
            .await
            .unwrap();
        assert_eq!(
            result.summary,
            format!("view <{path}> [empty] (fallback from requested [1-100], total=0)")
        );
        assert_eq!(result.output, "");
    }

    #[tokio::test]
    async fn relative_path_is_invalid() {
        let err = run(&serde_json::json!({"path": "rel.txt", "start": 1, "end": 1}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_tool_input");
    }

    #[tokio::test]
    async fn bad_ranges_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = seed(&dir, "f.txt", "x\n").await;
        for (start, end) in [(0, 1), (3, 2)] {
            let err = run(&serde_json::json!({"path": path, "start": start, "end": end}))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "invalid_tool_input");
        }
    }
}
