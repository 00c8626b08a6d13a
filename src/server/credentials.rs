//! # Credential Store
//!
//! In-memory list of username/password pairs, loaded once at boot from the
//! users file. When that file does not exist a single `root` credential with
//! a random numeric password is generated and written, and handed back to the
//! caller so the operator can be told the password.
//!
//! The list is never mutated after boot; logins only read it.

use anyhow::{Context, Result};
use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use tokio::sync::RwLock;

use super::persist::write_atomic;

/// Username of the credential generated on first run.
pub const ROOT_USERNAME: &str = "root";

/// One plaintext username/password pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Password")]
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// A `root` credential with a random 5-6 digit password.
    pub fn generate_root() -> Self {
        let password = rand::thread_rng().gen_range(99_999..999_999u32);
        Self::new(ROOT_USERNAME, password.to_string())
    }
}

pub struct CredentialStore {
    users: RwLock<Vec<Credential>>,
}

impl CredentialStore {
    pub fn new(users: Vec<Credential>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }

    /// Load the users file, or bootstrap it with a generated root credential.
    ///
    /// # Returns
    /// The store, plus the generated credential when a bootstrap happened.
    pub async fn load_or_bootstrap(path: &Path) -> Result<(Self, Option<Credential>)> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let users: Vec<Credential> = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing users file {}", path.display()))?;
                info!("👥 Loaded {} users", users.len());
                Ok((Self::new(users), None))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let store = Self::new(Vec::new());
                let root = Credential::generate_root();
                {
                    // Logins wait on this lock until the file is on disk
                    let mut users = store.users.write().await;
                    users.push(root.clone());
                    let bytes = serde_json::to_vec(&*users)?;
                    write_atomic(path, &bytes).await?;
                }
                info!("👤 Created users file {}", path.display());
                Ok((store, Some(root)))
            }
            Err(e) => {
                Err(e).with_context(|| format!("reading users file {}", path.display()))
            }
        }
    }

    /// Exact, case-sensitive match of both fields against any stored record.
    pub async fn check(&self, username: &str, password: &str) -> bool {
        let users = self.users.read().await;
        users
            .iter()
            .any(|u| u.username == username && u.password == password)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}
