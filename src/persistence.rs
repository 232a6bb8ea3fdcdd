//! JSON snapshots of ban lists and accounts.
//!
//! Writes go to a temp file that is renamed over the target, so a crash
//! mid-save leaves the previous snapshot intact. A missing file loads as
//! `None` (first run).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::security::{BanEntry, BanList};
use crate::state::{Accounts, AccountsFile};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// On-disk form of a ban list.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BanFile {
    pub bans: Vec<BanEntry>,
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let temp_path = path.with_extension("json.tmp");
    let file = File::create(&temp_path).map_err(|e| PersistenceError::io(&temp_path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| PersistenceError::json(&temp_path, e))?;
    writer
        .flush()
        .map_err(|e| PersistenceError::io(&temp_path, e))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| PersistenceError::io(path, e))?;
    debug!(path = %path.display(), "Snapshot saved");
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|e| PersistenceError::json(path, e))
}

/// Save every live entry of `list`.
pub fn save_bans(list: &BanList, path: &Path, now: i64) -> Result<usize, PersistenceError> {
    let file = BanFile {
        bans: list
            .iter()
            .map(|(_, entry)| entry)
            .filter(|entry| !entry.is_expired(now))
            .cloned()
            .collect(),
    };
    save_json(path, &file)?;
    Ok(file.bans.len())
}

/// Load a ban list, skipping expired and invalid entries.
pub fn load_bans(path: &Path, now: i64) -> Result<Option<BanList>, PersistenceError> {
    let Some(file) = load_json::<BanFile>(path)? else {
        return Ok(None);
    };
    let mut list = BanList::new();
    for entry in file.bans.into_iter().filter(|e| !e.is_expired(now)) {
        if let Err(e) = list.add(
            &entry.op,
            entry.nick.as_deref(),
            entry.ip,
            entry.netmask,
            &entry.reason,
            entry.expiry,
        ) {
            warn!(path = %path.display(), error = %e, "Skipping ban entry");
        }
    }
    Ok(Some(list))
}

pub fn save_accounts(accounts: &Accounts, path: &Path) -> Result<(), PersistenceError> {
    save_json(path, &accounts.to_file())
}

pub fn load_accounts(path: &Path) -> Result<Option<Accounts>, PersistenceError> {
    Ok(load_json::<AccountsFile>(path)?.map(Accounts::from_file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Rights;
    use std::net::Ipv4Addr;

    #[test]
    fn test_bans_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.json");
        let mut list = BanList::new();
        list.add(
            "op",
            Some("Mallory"),
            Ipv4Addr::new(10, 1, 2, 3),
            Ipv4Addr::new(255, 255, 0, 0),
            "flooding",
            Some(2000),
        )
        .unwrap();
        list.add("op", None, Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::BROADCAST, "", None)
            .unwrap();
        list.add("op", None, Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::BROADCAST, "old", Some(10))
            .unwrap();

        assert_eq!(save_bans(&list, &path, 1000).unwrap(), 2);
        let mut loaded = load_bans(&path, 1000).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        let entry = loaded
            .find_by_ip_any_mask(Ipv4Addr::new(10, 1, 99, 99), 1000)
            .unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(10, 1, 0, 0));
        assert_eq!(entry.nick.as_deref(), Some("Mallory"));
        assert_eq!(entry.reason, "flooding");
        assert_eq!(entry.expiry, Some(2000));
        assert!(loaded.find_by_nick("mallory", 1000).is_some());
    }

    #[test]
    fn test_missing_file_is_first_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_bans(&dir.path().join("none.json"), 0).unwrap().is_none());
        assert!(load_accounts(&dir.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_bans(&path, 0),
            Err(PersistenceError::Json { .. })
        ));
    }

    #[test]
    fn test_accounts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let mut accounts = Accounts::new();
        accounts.set_group("ops", Rights::OP | Rights::KICK);
        accounts
            .add_account("Alice", "ops", Some("secret"), "owner", 100)
            .unwrap();
        save_accounts(&accounts, &path).unwrap();

        let loaded = load_accounts(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.group("ops").unwrap().rights, Rights::OP | Rights::KICK);
        let account = loaded.account("alice").unwrap();
        assert_eq!(account.registered_by, "owner");
        assert!(loaded.requires_password("Alice"));
        assert!(!path.with_extension("json.tmp").exists());
    }
}
