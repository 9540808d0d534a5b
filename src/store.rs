//! Atomic append-only JSONL store (C2).
//!
//! Ports `agents/file_lock.py`'s `atomic_append` / `read_jsonl` /
//! `read_jsonl_by_id` / `update_jsonl_record` semantics onto a sidecar
//! `.lock` file held with `fs2`'s advisory exclusive lock, using the same
//! `XError` + `Result<T, XError>` + typed-CRUD-method shape as the teacher's
//! `state/store.rs`.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use serde::Serialize;
use serde_json::Value;

use crate::error::{LockError, StoreError, StoreResult};

const MAX_LOCK_RETRIES: u32 = 10;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Hold an exclusive advisory lock on `path`'s `.lock` sidecar for the
/// duration of `f`, retrying with doubling backoff up to `MAX_LOCK_RETRIES`
/// times (§5 "bounded retries with exponential backoff, capped delay, fixed
/// ceiling").
fn with_exclusive_lock<T>(
    path: &Path,
    f: impl FnOnce() -> StoreResult<T>,
) -> StoreResult<T> {
    let lock_path = lock_sidecar(path);
    let lock_file = File::create(&lock_path).map_err(|source| {
        StoreError::Lock(LockError::Io {
            path: lock_path.clone(),
            source,
        })
    })?;

    let mut delay = INITIAL_RETRY_DELAY;
    let mut attempt = 0;
    loop {
        match lock_file.try_lock_exclusive() {
            Ok(()) => break,
            Err(_) if attempt + 1 < MAX_LOCK_RETRIES => {
                attempt += 1;
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(_) => {
                return Err(StoreError::Lock(LockError::TimedOut {
                    path: lock_path,
                    attempts: MAX_LOCK_RETRIES,
                }))
            }
        }
    }

    let result = f();
    let _ = fs2::FileExt::unlock(&lock_file);
    result
}

/// Hold an exclusive advisory lock on `path`'s `.lock` sidecar for the
/// duration of `f`, blocking until the lock is free rather than retrying a
/// non-blocking attempt (§4.2 `update`: "under the same lock" as `append`,
/// but blocking, not the bounded-retry non-blocking append lock).
fn with_exclusive_lock_blocking<T>(
    path: &Path,
    f: impl FnOnce() -> StoreResult<T>,
) -> StoreResult<T> {
    let lock_path = lock_sidecar(path);
    let lock_file = File::create(&lock_path).map_err(|source| {
        StoreError::Lock(LockError::Io {
            path: lock_path.clone(),
            source,
        })
    })?;

    lock_file.lock_exclusive().map_err(|source| {
        StoreError::Lock(LockError::Io {
            path: lock_path.clone(),
            source,
        })
    })?;

    let result = f();
    let _ = fs2::FileExt::unlock(&lock_file);
    result
}

fn lock_sidecar(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

fn ensure_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Append one JSON-serialised record as a single newline-terminated line,
/// durably flushed before the lock is released (§4.2, I-append-safety).
pub fn append<T: Serialize>(path: &Path, record: &T) -> StoreResult<()> {
    let line = serde_json::to_string(record).map_err(StoreError::Serialize)?;
    ensure_parent(path)?;

    with_exclusive_lock(path, || {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        file.sync_all().map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    })
}

/// Read every record in the file, skipping (and logging) any line that
/// fails to parse rather than aborting the whole read.
pub fn read_all(path: &Path) -> StoreResult<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => records.push(value),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_num + 1,
                    %err,
                    "corrupt JSONL line skipped"
                );
            }
        }
    }
    Ok(records)
}

/// Read typed records, skipping any line that is valid JSON but doesn't
/// match `T`'s schema (treated the same as a corrupt line).
pub fn read_all_typed<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    let raw = read_all(path)?;
    let mut out = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<T>(value) {
            Ok(record) => out.push(record),
            Err(err) => tracing::warn!(path = %path.display(), %err, "record failed to deserialize"),
        }
    }
    Ok(out)
}

/// Linear scan for the first record whose `id_field` equals `id`.
pub fn find_by_id(path: &Path, id: &str, id_field: &str) -> StoreResult<Option<Value>> {
    let records = read_all(path)?;
    Ok(records
        .into_iter()
        .find(|r| r.get(id_field).and_then(Value::as_str) == Some(id)))
}

/// Apply a shallow patch to the first record whose `id_field` equals `id`,
/// rewriting the whole file to a temp sibling and rename-replacing it —
/// either the old contents or the new contents are ever observable (I5/I-update-atomicity).
pub fn update(
    path: &Path,
    id: &str,
    id_field: &str,
    patch: impl FnOnce(&mut Value),
) -> StoreResult<bool> {
    if !path.exists() {
        return Ok(false);
    }

    with_exclusive_lock_blocking(path, || {
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);

        // `None` marks an unparsable line we preserve by position but can't
        // round-trip — it is simply dropped on rewrite (corrupt lines never
        // belong in the active log; the quarantine sweep is what relocates them).
        let mut records: Vec<Option<Value>> = Vec::new();
        let mut found = false;

        for line in reader.lines() {
            let line = line.map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(mut record) => {
                    if !found && record.get(id_field).and_then(Value::as_str) == Some(id) {
                        patch(&mut record);
                        found = true;
                    }
                    records.push(Some(record));
                }
                Err(_) => records.push(None),
            }
        }

        if !found {
            return Ok(false);
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("store")
        ));

        let write_result = (|| -> StoreResult<()> {
            let mut tmp = File::create(&tmp_path).map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            for record in records.iter().flatten() {
                let line = serde_json::to_string(record).map_err(StoreError::Serialize)?;
                writeln!(tmp, "{line}").map_err(|source| StoreError::Io {
                    path: tmp_path.clone(),
                    source,
                })?;
            }
            tmp.sync_all().map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            Ok(())
        })();

        if let Err(err) = write_result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }

        std::fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        append(&path, &json!({"id": "a", "n": 1})).unwrap();
        append(&path, &json!({"id": "b", "n": 2})).unwrap();

        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "a");
    }

    #[test]
    fn read_all_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        std::fs::write(&path, "{\"id\":\"a\"}\nnot json\n{\"id\":\"b\"}\n").unwrap();

        let records = read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn find_by_id_returns_first_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        append(&path, &json!({"id": "a", "n": 1})).unwrap();
        append(&path, &json!({"id": "b", "n": 2})).unwrap();

        let found = find_by_id(&path, "b", "id").unwrap().unwrap();
        assert_eq!(found["n"], 2);
        assert!(find_by_id(&path, "z", "id").unwrap().is_none());
    }

    #[test]
    fn update_patches_first_match_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        append(&path, &json!({"id": "a", "count": 1})).unwrap();
        append(&path, &json!({"id": "b", "count": 1})).unwrap();

        let updated = update(&path, "a", "id", |v| {
            v["count"] = json!(2);
        })
        .unwrap();
        assert!(updated);

        let records = read_all(&path).unwrap();
        assert_eq!(records[0]["count"], 2);
        assert_eq!(records[1]["count"], 1);
    }

    #[test]
    fn update_missing_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        append(&path, &json!({"id": "a"})).unwrap();

        let updated = update(&path, "zzz", "id", |_| {}).unwrap();
        assert!(!updated);
    }

    #[test]
    fn update_on_missing_file_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.jsonl");
        assert!(!update(&path, "a", "id", |_| {}).unwrap());
    }
}
