//! Workspace files — state-backed virtual files.
//!
//! Each path is a derived view of the state store (`config/envs.json`,
//! `config/channels/<id>.json`, `skills/<name>.json`). Writes go through
//! validated setters, never raw file writes.

use serde_json::Value;

use nextai_domain::channel::ChannelsConfig;
use nextai_domain::error::{Error, Result};
use nextai_store::State;

const ENVS_PATH: &str = "config/envs.json";
const CHANNELS_PREFIX: &str = "config/channels/";
const SKILLS_PREFIX: &str = "skills/";

/// All paths currently present in the workspace view.
pub fn list_paths(state: &State) -> Vec<String> {
    let mut paths = vec![ENVS_PATH.to_owned()];
    for id in ChannelsConfig::known_ids() {
        paths.push(format!("{CHANNELS_PREFIX}{id}.json"));
    }
    let mut skills: Vec<String> = state
        .skills
        .keys()
        .map(|name| format!("{SKILLS_PREFIX}{name}.json"))
        .collect();
    skills.sort();
    paths.extend(skills);
    paths
}

pub fn read_path(state: &State, path: &str) -> Result<Value> {
    if path == ENVS_PATH {
        return Ok(serde_json::to_value(&state.envs)?);
    }
    if let Some(id) = channel_id(path) {
        return state.channels.get(id);
    }
    if let Some(name) = skill_name(path)? {
        return state
            .skills
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("workspace file {path:?} not found")));
    }
    Err(Error::NotFound(format!("workspace file {path:?} not found")))
}

pub fn write_path(state: &mut State, path: &str, body: Value) -> Result<()> {
    if path == ENVS_PATH {
        let envs: std::collections::HashMap<String, String> = serde_json::from_value(body)
            .map_err(|e| {
                Error::InvalidRequest(format!("envs.json must map names to string values: {e}"))
            })?;
        state.envs = envs;
        return Ok(());
    }
    if let Some(id) = channel_id(path) {
        return state.channels.set(id, body);
    }
    if let Some(name) = skill_name(path)? {
        if !body.is_object() {
            return Err(Error::InvalidRequest(
                "skill documents must be JSON objects".into(),
            ));
        }
        state.skills.insert(name.to_owned(), body);
        return Ok(());
    }
    Err(Error::NotFound(format!("workspace file {path:?} not found")))
}

pub fn delete_path(state: &mut State, path: &str) -> Result<()> {
    if path == ENVS_PATH {
        state.envs.clear();
        return Ok(());
    }
    if let Some(id) = channel_id(path) {
        return state.channels.reset(id);
    }
    if let Some(name) = skill_name(path)? {
        return state
            .skills
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("workspace file {path:?} not found")));
    }
    Err(Error::NotFound(format!("workspace file {path:?} not found")))
}

fn channel_id(path: &str) -> Option<&str> {
    path.strip_prefix(CHANNELS_PREFIX)?.strip_suffix(".json")
}

/// Skill names are restricted so a path can never escape the view.
fn skill_name(path: &str) -> Result<Option<&str>> {
    let name = match path.strip_prefix(SKILLS_PREFIX).and_then(|n| n.strip_suffix(".json")) {
        Some(n) => n,
        None => return Ok(None),
    };
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidRequest(format!(
            "invalid skill name in path {path:?}"
        )));
    }
    Ok(Some(name))
}
