//! Username/password lookup shared by Basic, Digest and form login.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use thiserror::Error;

use crate::services::auth::secret::{constant_time_eq, sha256_hex};

/// A known user and the authorities they hold.
#[derive(Clone)]
pub struct UserRecord {
    pub username: String,
    password: String,
    pub authorities: BTreeSet<String>,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the password
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("authorities", &self.authorities)
            .finish_non_exhaustive()
    }
}

impl UserRecord {
    pub fn new<I, S>(username: impl Into<String>, password: impl Into<String>, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            username: username.into(),
            password: password.into(),
            authorities: authorities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn verify_password(&self, candidate: &str) -> bool {
        constant_time_eq(&self.password, candidate)
    }

    /// RFC 7616 `H(username:realm:password)` with SHA-256.
    pub fn digest_ha1(&self, realm: &str) -> String {
        sha256_hex(&format!("{}:{}:{}", self.username, realm, self.password))
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, username: &str) -> Option<UserRecord>;

    /// Look the user up and check the password.
    async fn verify(&self, username: &str, password: &str) -> Option<UserRecord> {
        self.lookup(username)
            .await
            .filter(|user| user.verify_password(password))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsParseError {
    #[error("user entry #{index} must look like user:password[:authority|authority]")]
    MalformedEntry { index: usize },
    #[error("duplicate user '{0}'")]
    DuplicateUser(String),
}

/// Fixed user table, typically loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    users: HashMap<String, UserRecord>,
}

impl MemoryCredentialStore {
    pub fn new(users: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }

    /// Parse `user:password[:auth|auth],user2:password2` (blank entries ignored).
    pub fn parse(entries: &str) -> Result<Self, CredentialsParseError> {
        let mut users = HashMap::new();

        for (index, entry) in entries.split(',').map(str::trim).enumerate() {
            if entry.is_empty() {
                continue;
            }

            let mut parts = entry.splitn(3, ':');
            let username = parts.next().unwrap_or_default().trim();
            let password = parts
                .next()
                .ok_or(CredentialsParseError::MalformedEntry { index })?;
            if username.is_empty() || password.is_empty() {
                return Err(CredentialsParseError::MalformedEntry { index });
            }

            let authorities = parts
                .next()
                .map(|a| {
                    a.split('|')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let record = UserRecord::new(username, password, authorities);
            if users.insert(username.to_string(), record).is_some() {
                return Err(CredentialsParseError::DuplicateUser(username.to_string()));
            }
        }

        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(&self, username: &str) -> Option<UserRecord> {
        self.users.get(username).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_users_and_authorities() {
        let store = MemoryCredentialStore::parse("alice:s3cret:read|write, bob:pw ,").unwrap();
        assert_eq!(store.len(), 2);

        let alice = &store.users["alice"];
        assert!(alice.verify_password("s3cret"));
        assert!(!alice.verify_password("s3cre"));
        assert_eq!(
            alice.authorities.iter().cloned().collect::<Vec<_>>(),
            ["read", "write"]
        );
        assert!(store.users["bob"].authorities.is_empty());
    }

    #[test]
    fn password_may_not_contain_colon_but_authorities_follow_it() {
        let store = MemoryCredentialStore::parse("carol:pw:admin").unwrap();
        assert!(store.users["carol"].verify_password("pw"));
        assert!(store.users["carol"].authorities.contains("admin"));
    }

    #[test]
    fn rejects_bad_entries() {
        assert_eq!(
            MemoryCredentialStore::parse("alice").unwrap_err(),
            CredentialsParseError::MalformedEntry { index: 0 }
        );
        assert_eq!(
            MemoryCredentialStore::parse("a:1,:2").unwrap_err(),
            CredentialsParseError::MalformedEntry { index: 1 }
        );
        assert_eq!(
            MemoryCredentialStore::parse("a:1,a:2").unwrap_err(),
            CredentialsParseError::DuplicateUser("a".into())
        );
    }

    #[tokio::test]
    async fn verify_checks_password() {
        let store = MemoryCredentialStore::parse("alice:pw").unwrap();
        assert!(store.verify("alice", "pw").await.is_some());
        assert!(store.verify("alice", "nope").await.is_none());
        assert!(store.verify("mallory", "pw").await.is_none());
    }
}
