//! Session directories: one generated id per user interaction.
//!
//! Every upload lands in `<root>/<session_id>/`. Ids look like
//! `session_20250101_120000_1a2b3c4d`: a UTC timestamp followed by eight hex
//! characters of a random UUID. Sorting ids by name therefore sorts them by
//! creation time, which is what [`SessionStore::clean_old_sessions`] relies on.
//!
//! Session ids coming from callers are parsed through [`SessionId::parse`],
//! which only accepts the generated shape, so an id can never escape the
//! store root.

use crate::error::{ErrorKind, PortalError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PREFIX: &str = "session_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;
const SUFFIX_LEN: usize = 8;
const CREATE_ATTEMPTS: usize = 5;

/// A validated session identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh id stamped with the current UTC time.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generate a fresh id stamped with `at`.
    pub fn generate_at(at: DateTime<Utc>) -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{PREFIX}{}_{}",
            at.format(TIMESTAMP_FORMAT),
            &hex[..SUFFIX_LEN]
        ))
    }

    /// Accept `raw` only if it has the generated shape.
    pub fn parse(raw: &str) -> Result<Self> {
        if Self::is_well_formed(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(PortalError::new(ErrorKind::InvalidSessionId {
                id: raw.to_string(),
            }))
        }
    }

    fn is_well_formed(raw: &str) -> bool {
        let Some(rest) = raw.strip_prefix(PREFIX) else {
            return false;
        };
        if rest.len() != TIMESTAMP_LEN + 1 + SUFFIX_LEN || !rest.is_ascii() {
            return false;
        }
        let (stamp, suffix) = rest.split_at(TIMESTAMP_LEN);
        let Some(hex) = suffix.strip_prefix('_') else {
            return false;
        };
        NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok()
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    /// Creation time encoded in the id.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let stamp = &self.0[PREFIX.len()..PREFIX.len() + TIMESTAMP_LEN];
        NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if Self::is_well_formed(&value) {
            Ok(Self(value))
        } else {
            Err(format!("invalid session id '{value}'"))
        }
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// A session directory on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Creates, lists and sweeps session directories under one root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new, uniquely named session directory.
    ///
    /// The leaf directory is made with `create_dir`, so an id collision is
    /// detected instead of silently sharing a directory.
    pub fn create(&self) -> Result<Session> {
        std::fs::create_dir_all(&self.root).map_err(|e| ErrorKind::io(&self.root, e))?;

        for _ in 0..CREATE_ATTEMPTS {
            let now = Utc::now();
            let id = SessionId::generate_at(now);
            let path = self.root.join(id.as_str());
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    info!("Session created: {}", path.display());
                    return Ok(Session {
                        id,
                        path,
                        created_at: now,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    warn!("Session id collision on {}; regenerating", id);
                }
                Err(e) => Err(ErrorKind::io(&path, e))?,
            }
        }

        Err(PortalError::new(ErrorKind::Internal(format!(
            "could not allocate a unique session under '{}' after {CREATE_ATTEMPTS} attempts",
            self.root.display()
        ))))
    }

    /// Open an existing session.
    pub fn open(&self, raw_id: &str) -> Result<Session> {
        let id = SessionId::parse(raw_id)?;
        let path = self.root.join(id.as_str());
        if !path.is_dir() {
            Err(ErrorKind::SessionNotFound {
                id: raw_id.to_string(),
                root: self.root.clone(),
            })?;
        }
        Ok(Session {
            created_at: id.timestamp(),
            id,
            path,
        })
    }

    /// Open `id` when given, otherwise create a fresh session.
    pub fn open_or_create(&self, id: Option<&str>) -> Result<Session> {
        match id {
            Some(id) => self.open(id),
            None => self.create(),
        }
    }

    /// All sessions under the root, newest first.
    ///
    /// Directories whose names are not session ids are ignored. A missing
    /// root yields an empty list.
    pub fn list(&self) -> Result<Vec<Session>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => Err(ErrorKind::io(&self.root, e))?,
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ErrorKind::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Ok(id) = SessionId::parse(name) {
                sessions.push(Session {
                    created_at: id.timestamp(),
                    id,
                    path,
                });
            }
        }

        sessions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(sessions)
    }

    /// Delete all but the `keep_latest` most recent sessions.
    ///
    /// Returns the ids that were removed.
    pub fn clean_old_sessions(&self, keep_latest: usize) -> Result<Vec<SessionId>> {
        self.sweep(keep_latest, None)
    }

    /// Like [`clean_old_sessions`](Self::clean_old_sessions), but `current`
    /// is never removed and counts as one of the kept sessions.
    ///
    /// Ids only order by the second they were created in, so a session
    /// created in the same second as `current` may sort above it.
    pub fn clean_old_sessions_except(
        &self,
        keep_latest: usize,
        current: &SessionId,
    ) -> Result<Vec<SessionId>> {
        self.sweep(keep_latest.saturating_sub(1), Some(current))
    }

    fn sweep(&self, keep_latest: usize, protect: Option<&SessionId>) -> Result<Vec<SessionId>> {
        let sessions = self
            .list()?
            .into_iter()
            .filter(|s| Some(&s.id) != protect);
        let mut removed = Vec::new();

        for session in sessions.skip(keep_latest) {
            std::fs::remove_dir_all(&session.path)
                .map_err(|e| ErrorKind::io(&session.path, e))?;
            debug!("Removed old session {}", session.id);
            removed.push(session.id);
        }

        if !removed.is_empty() {
            info!(
                "Cleaned {} old session(s) under {}, kept latest {}",
                removed.len(),
                self.root.display(),
                keep_latest
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_id_shape() {
        let at = Utc.with_ymd_and_hms(2025, 7, 1, 9, 30, 5).unwrap();
        let id = SessionId::generate_at(at);
        let s = id.as_str();
        assert!(s.starts_with("session_20250701_093005_"), "got {s}");
        assert_eq!(s.len(), "session_20250701_093005_".len() + 8);
        assert_eq!(id.timestamp(), at);
        assert!(SessionId::parse(s).is_ok());
    }

    #[test]
    fn parse_rejects_traversal_and_junk() {
        for bad in [
            "",
            "..",
            "../etc",
            "session_",
            "session_20250701_093005_../..",
            "session_20251301_093005_abcdef12", // month 13
            "session_20250701_093005_ABCDEF12", // uppercase hex
            "other_20250701_093005_abcdef12",
        ] {
            let err = SessionId::parse(bad).unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::InvalidSessionId { .. }),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn ids_are_unique() {
        let ids: std::collections::HashSet<_> =
            (0..200).map(|_| SessionId::generate()).collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("analyzer_docs"));
        let session = store.create().unwrap();
        assert!(session.path.is_dir());
        let reopened = store.open(session.id.as_str()).unwrap();
        assert_eq!(reopened.path, session.path);
    }

    #[test]
    fn open_missing_session_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let id = SessionId::generate();
        let err = store.open(id.as_str()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SessionNotFound { .. }));
    }

    #[test]
    fn list_is_newest_first_and_skips_foreign_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        for name in [
            "session_20240101_000000_aaaaaaaa",
            "session_20250101_000000_bbbbbbbb",
            "session_20230101_000000_cccccccc",
            "not_a_session",
        ] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("session_20260101_000000_dddddddd"), b"file").unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "session_20250101_000000_bbbbbbbb",
                "session_20240101_000000_aaaaaaaa",
                "session_20230101_000000_cccccccc",
            ]
        );
    }

    #[test]
    fn clean_keeps_latest_n() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        for day in 1..=5 {
            let name = format!("session_202501{day:02}_000000_0000000{day}");
            std::fs::create_dir(dir.path().join(&name)).unwrap();
            std::fs::write(dir.path().join(&name).join("a.pdf"), b"%PDF").unwrap();
        }
        std::fs::create_dir(dir.path().join("keep_me")).unwrap();

        let removed = store.clean_old_sessions(2).unwrap();
        assert_eq!(removed.len(), 3);

        let left: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id.to_string()).collect();
        assert_eq!(
            left,
            vec!["session_20250105_000000_00000005", "session_20250104_000000_00000004"]
        );
        assert!(dir.path().join("keep_me").is_dir());
    }

    #[test]
    fn current_session_survives_same_second_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let current = SessionId::parse("session_20250101_000000_00000001").unwrap();
        for name in [current.as_str(), "session_20250101_000000_ffffffff", "session_20241231_000000_0000000a"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }

        let removed = store.clean_old_sessions_except(1, &current).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!removed.contains(&current));
        assert!(dir.path().join(current.as_str()).is_dir());
    }

    #[test]
    fn keep_zero_still_spares_current() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let older = store.create().unwrap();
        std::fs::rename(&older.path, dir.path().join("session_20200101_000000_00000001")).unwrap();
        let current = store.create().unwrap();

        let removed = store.clean_old_sessions_except(0, &current.id).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].as_str(), "session_20200101_000000_00000001");
        assert!(current.path.is_dir());
    }

    #[test]
    fn list_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nope"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.clean_old_sessions(0).unwrap().is_empty());
    }
}
