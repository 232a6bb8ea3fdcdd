//! Registered accounts and rights groups.
//!
//! An account's effective rights are its group's rights unioned with the
//! per-account grants. Passwords are stored as argon2 PHC strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::rights::Rights;
use crate::security::password::{hash_password, verify_password};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("no such group: {0}")]
    UnknownGroup(String),
    #[error("no such user: {0}")]
    UnknownAccount(String),
    #[error("user {0} is already registered")]
    AccountExists(String),
    #[error("group {0} still has {1} members")]
    GroupInUse(String, usize),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub rights: Rights,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub nick: String,
    /// Argon2 PHC string; `None` logs in without a password.
    #[serde(default)]
    pub password: Option<String>,
    pub group: String,
    /// Granted on top of the group's rights.
    #[serde(default)]
    pub rights: Rights,
    pub registered_by: String,
    pub registered_at: i64,
    #[serde(default)]
    pub last_login: Option<i64>,
    #[serde(skip)]
    pub bad_passwords: u32,
}

/// Result of a password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Accepted,
    Rejected,
    /// The account has no password set.
    NotRequired,
}

/// Serialised form of [`Accounts`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AccountsFile {
    pub groups: Vec<Group>,
    pub accounts: Vec<Account>,
}

#[derive(Debug, Default)]
pub struct Accounts {
    groups: BTreeMap<String, Group>,
    accounts: BTreeMap<String, Account>,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Create a group or replace the rights of an existing one.
    pub fn set_group(&mut self, name: &str, rights: Rights) {
        self.groups
            .entry(key(name))
            .and_modify(|group| group.rights = rights)
            .or_insert_with(|| Group {
                name: name.to_string(),
                rights,
            });
    }

    pub fn remove_group(&mut self, name: &str) -> Result<Group, AccountError> {
        let members = self
            .accounts
            .values()
            .filter(|account| account.group.eq_ignore_ascii_case(name))
            .count();
        if members > 0 {
            return Err(AccountError::GroupInUse(name.to_string(), members));
        }
        self.groups
            .remove(&key(name))
            .ok_or_else(|| AccountError::UnknownGroup(name.to_string()))
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(&key(name))
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn account(&self, nick: &str) -> Option<&Account> {
        self.accounts.get(&key(nick))
    }

    pub fn add_account(
        &mut self,
        nick: &str,
        group: &str,
        password: Option<&str>,
        registered_by: &str,
        now: i64,
    ) -> Result<&Account, AccountError> {
        if self.accounts.contains_key(&key(nick)) {
            return Err(AccountError::AccountExists(nick.to_string()));
        }
        let group = self
            .group(group)
            .ok_or_else(|| AccountError::UnknownGroup(group.to_string()))?
            .name
            .clone();
        let password = password
            .map(|pw| hash_password(pw).map_err(|e| AccountError::Hash(e.to_string())))
            .transpose()?;
        let account = Account {
            nick: nick.to_string(),
            password,
            group,
            rights: Rights::NONE,
            registered_by: registered_by.to_string(),
            registered_at: now,
            last_login: None,
            bad_passwords: 0,
        };
        Ok(self.accounts.entry(key(nick)).or_insert(account))
    }

    pub fn remove_account(&mut self, nick: &str) -> Result<Account, AccountError> {
        self.accounts
            .remove(&key(nick))
            .ok_or_else(|| AccountError::UnknownAccount(nick.to_string()))
    }

    fn account_mut(&mut self, nick: &str) -> Result<&mut Account, AccountError> {
        self.accounts
            .get_mut(&key(nick))
            .ok_or_else(|| AccountError::UnknownAccount(nick.to_string()))
    }

    pub fn set_password(&mut self, nick: &str, password: &str) -> Result<(), AccountError> {
        let hash = hash_password(password).map_err(|e| AccountError::Hash(e.to_string()))?;
        self.account_mut(nick)?.password = Some(hash);
        Ok(())
    }

    pub fn grant(&mut self, nick: &str, rights: Rights) -> Result<Rights, AccountError> {
        let account = self.account_mut(nick)?;
        account.rights.insert(rights);
        Ok(account.rights)
    }

    pub fn revoke(&mut self, nick: &str, rights: Rights) -> Result<Rights, AccountError> {
        let account = self.account_mut(nick)?;
        account.rights.remove(rights);
        Ok(account.rights)
    }

    /// Effective rights of a registered nick: group rights plus grants.
    pub fn rights_of(&self, nick: &str) -> Option<Rights> {
        let account = self.account(nick)?;
        let group = self
            .group(&account.group)
            .map_or(Rights::NONE, |group| group.rights);
        Some(group | account.rights)
    }

    pub fn requires_password(&self, nick: &str) -> bool {
        self.account(nick)
            .is_some_and(|account| account.password.is_some())
    }

    pub fn check_password(&self, nick: &str, password: &str) -> PasswordCheck {
        let Some(stored) = self.account(nick).and_then(|a| a.password.as_deref()) else {
            return PasswordCheck::NotRequired;
        };
        match verify_password(password, stored) {
            Ok(true) => PasswordCheck::Accepted,
            Ok(false) => PasswordCheck::Rejected,
            Err(e) => {
                warn!(nick = %nick, error = %e, "stored password hash is unreadable");
                PasswordCheck::Rejected
            }
        }
    }

    /// Count a wrong password. Returns true when `retries` is reached, in
    /// which case the counter starts over.
    pub fn record_bad_password(&mut self, nick: &str, retries: u32) -> bool {
        let Ok(account) = self.account_mut(nick) else {
            return false;
        };
        account.bad_passwords += 1;
        debug!(nick = %nick, failures = account.bad_passwords, "bad password");
        if account.bad_passwords >= retries.max(1) {
            account.bad_passwords = 0;
            return true;
        }
        false
    }

    pub fn record_login(&mut self, nick: &str, now: i64) {
        if let Ok(account) = self.account_mut(nick) {
            account.bad_passwords = 0;
            account.last_login = Some(now);
        }
    }

    pub fn to_file(&self) -> AccountsFile {
        AccountsFile {
            groups: self.groups.values().cloned().collect(),
            accounts: self.accounts.values().cloned().collect(),
        }
    }

    pub fn from_file(file: AccountsFile) -> Self {
        let mut accounts = Self::new();
        for group in file.groups {
            accounts.groups.insert(key(&group.name), group);
        }
        for account in file.accounts {
            accounts.accounts.insert(key(&account.nick), account);
        }
        accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> Accounts {
        let mut accounts = Accounts::new();
        accounts.set_group("ops", Rights::OP | Rights::KICK);
        accounts.set_group("reg", Rights::CHAT);
        accounts
    }

    #[test]
    fn test_rights_union_group_and_grants() {
        let mut accounts = accounts();
        accounts.add_account("Alice", "reg", None, "root", 0).unwrap();
        assert_eq!(accounts.rights_of("alice"), Some(Rights::CHAT));
        accounts.grant("ALICE", Rights::PM).unwrap();
        assert_eq!(accounts.rights_of("alice"), Some(Rights::CHAT | Rights::PM));
        accounts.revoke("alice", Rights::PM).unwrap();
        assert_eq!(accounts.rights_of("alice"), Some(Rights::CHAT));
        assert_eq!(accounts.rights_of("bob"), None);
    }

    #[test]
    fn test_unknown_group_and_duplicates() {
        let mut accounts = accounts();
        assert!(matches!(
            accounts.add_account("x", "nope", None, "root", 0),
            Err(AccountError::UnknownGroup(_))
        ));
        accounts.add_account("x", "reg", None, "root", 0).unwrap();
        assert!(matches!(
            accounts.add_account("X", "reg", None, "root", 0),
            Err(AccountError::AccountExists(_))
        ));
        assert!(matches!(
            accounts.remove_group("reg"),
            Err(AccountError::GroupInUse(_, 1))
        ));
        accounts.remove_account("x").unwrap();
        accounts.remove_group("reg").unwrap();
    }

    #[test]
    fn test_password_flow() {
        let mut accounts = accounts();
        accounts
            .add_account("op", "ops", Some("hunter2"), "root", 0)
            .unwrap();
        assert!(accounts.requires_password("op"));
        assert_eq!(accounts.check_password("op", "hunter2"), PasswordCheck::Accepted);
        assert_eq!(accounts.check_password("op", "wrong"), PasswordCheck::Rejected);
        assert_eq!(accounts.check_password("nobody", "x"), PasswordCheck::NotRequired);

        accounts.set_password("op", "changed").unwrap();
        assert_eq!(accounts.check_password("op", "changed"), PasswordCheck::Accepted);
    }

    #[test]
    fn test_bad_password_counter() {
        let mut accounts = accounts();
        accounts.add_account("op", "ops", Some("pw"), "root", 0).unwrap();
        assert!(!accounts.record_bad_password("op", 3));
        assert!(!accounts.record_bad_password("op", 3));
        assert!(accounts.record_bad_password("op", 3));
        assert_eq!(accounts.account("op").unwrap().bad_passwords, 0);

        accounts.record_bad_password("op", 3);
        accounts.record_login("op", 100);
        let account = accounts.account("op").unwrap();
        assert_eq!(account.bad_passwords, 0);
        assert_eq!(account.last_login, Some(100));
    }

    #[test]
    fn test_file_round_trip() {
        let mut accounts = accounts();
        accounts.add_account("op", "ops", Some("pw"), "root", 7).unwrap();
        let restored = Accounts::from_file(accounts.to_file());
        assert_eq!(restored.account("op"), accounts.account("op"));
        assert_eq!(restored.groups().count(), 2);
    }
}
