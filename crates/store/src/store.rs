//! The store itself: load, transactions, atomic persistence.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use nextai_domain::error::{Error, Result};

use crate::migrate;
use crate::state::State;

const STATE_FILE: &str = "state.json";

/// Process-wide state store backed by `data_dir/state.json`.
///
/// Readers get a shared snapshot; writers run against a clone under the
/// exclusive lock and only publish (memory and disk) when the closure and
/// the atomic file write both succeed.
pub struct Store {
    data_dir: PathBuf,
    state_path: PathBuf,
    state: RwLock<State>,
}

impl Store {
    /// Open (or initialize) the store at `data_dir`.
    ///
    /// Runs the migration pass, seeds defaults, and persists the result so
    /// the on-disk file always reflects the current schema.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let state_path = data_dir.join(STATE_FILE);

        let mut state = if state_path.exists() {
            let raw = std::fs::read_to_string(&state_path)?;
            serde_json::from_str(&raw)?
        } else {
            State::default()
        };

        let migrated = migrate::migrate(&mut state);
        state.ensure_defaults();

        let store = Self {
            data_dir: data_dir.to_owned(),
            state_path,
            state: RwLock::new(state),
        };
        store.persist(&store.state.read())?;

        tracing::info!(
            path = %store.state_path.display(),
            migrated,
            "state store loaded"
        );
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Run `f` against a shared read snapshot. No mutation escapes `f`.
    pub fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.read())
    }

    /// Run `f` against a mutable copy under the exclusive lock.
    ///
    /// On `Ok`, the copy is serialized, written atomically (temp file +
    /// rename), and becomes the current state. On `Err` the copy is
    /// discarded and nothing changes.
    pub fn write<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut guard = self.state.write();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        self.persist(&draft)?;
        *guard = draft;
        Ok(out)
    }

    /// Serialize and atomically replace `state.json`. Readers observe either
    /// the old or the new complete file, never a partial one.
    fn persist(&self, state: &State) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::StorageWriteFailed(format!("serializing state: {e}")))?;

        let tmp_name = format!(".{STATE_FILE}.{}.tmp", uuid::Uuid::new_v4().as_simple());
        let tmp_path = self.state_path.with_file_name(tmp_name);

        let write = || -> std::io::Result<()> {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_data()?;
            std::fs::rename(&tmp_path, &self.state_path)
        };

        write().map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            Error::StorageWriteFailed(format!(
                "writing {}: {e}",
                self.state_path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextai_domain::chat::{ChatMessage, Role, DEFAULT_CHAT_ID};

    #[test]
    fn open_seeds_and_persists_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(dir.path().join("state.json").exists());
        store.read(|s| {
            assert!(s.chats.contains_key(DEFAULT_CHAT_ID));
            assert_eq!(s.providers.len(), 2);
        });
    }

    #[test]
    fn write_publishes_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store
                .write(|s| {
                    let id = s.ensure_chat("u1", "console", "s1");
                    s.append_messages(&id, vec![ChatMessage::new(Role::User, "hello")]);
                    Ok(id)
                })
                .unwrap();
        }

        let store = Store::open(dir.path()).unwrap();
        store.read(|s| {
            let chat = s.find_chat("u1", "console", "s1").expect("chat persisted");
            assert_eq!(s.messages[&chat.id].len(), 1);
            assert_eq!(s.messages[&chat.id][0].flatten_text(), "hello");
        });
    }

    #[test]
    fn failed_write_discards_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let err = store
            .write(|s| -> Result<()> {
                s.ensure_chat("u9", "console", "s9");
                Err(Error::InvalidRequest("boom".into()))
            })
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");

        store.read(|s| {
            assert!(s.find_chat("u9", "console", "s9").is_none());
        });
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        for _ in 0..3 {
            store
                .write(|s| {
                    s.envs.insert("K".into(), "V".into());
                    Ok(())
                })
                .unwrap();
        }
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn concurrent_appends_serialize_on_the_write_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(Store::open(dir.path()).unwrap());
        let chat_id = store
            .write(|s| Ok(s.ensure_chat("u1", "console", "s1")))
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let chat_id = chat_id.clone();
            handles.push(std::thread::spawn(move || {
                store
                    .write(|s| {
                        s.append_messages(
                            &chat_id,
                            vec![ChatMessage::new(Role::User, format!("m{i}"))],
                        );
                        Ok(())
                    })
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        store.read(|s| assert_eq!(s.messages[&chat_id].len(), 8));
    }
}
