//! The `edit` tool — replace a line range of a file.
//!
//! Unlike `view`, an out-of-bounds range is a hard input error: the exact
//! message is fed back to the model by the agent loop's recovery path.

use serde::Deserialize;
use serde_json::Value;

use nextai_domain::error::{Error, Result};

use crate::registry::ItemResult;
use crate::view::validate_range;

pub(crate) const OUT_OF_BOUNDS_MESSAGE: &str = "tool input line range is out of file bounds";

#[derive(Debug, Deserialize)]
struct EditItem {
    path: String,
    start: i64,
    end: i64,
    content: String,
}

pub(crate) async fn run(item: &Value) -> Result<ItemResult> {
    let item: EditItem = serde_json::from_value(item.clone())
        .map_err(|e| Error::InvalidToolInput(format!("invalid edit item: {e}")))?;
    let (path, start, end) = validate_range(&item.path, item.start, item.end)?;

    let existing = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::InvalidToolInput(format!("cannot read {}: {e}", path.display())))?;
    let lines: Vec<&str> = existing.lines().collect();
    let total = lines.len();

    if start > total || end > total {
        return Err(Error::InvalidToolInput(OUT_OF_BOUNDS_MESSAGE.into()));
    }

    let mut updated: Vec<&str> = Vec::with_capacity(total);
    updated.extend_from_slice(&lines[..start - 1]);
    updated.extend(item.content.split('\n'));
    updated.extend_from_slice(&lines[end..]);

    let mut body = updated.join("\n");
    if existing.ends_with('\n') {
        body.push('\n');
    }

    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| Error::InvalidToolInput(format!("cannot write {}: {e}", path.display())))?;

    Ok(ItemResult {
        ok: true,
        summary: format!("edit <{}> [{start}-{end}] replaced", item.path),
        output: String::new(),
        raw: serde_json::json!({
            "path": item.path,
            "start": start,
            "end": end,
            "replaced_lines": end - start + 1,
            "new_total": updated.len(),
        }),
    })
}
