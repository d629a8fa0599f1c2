use crate::error::ServiceError;
use crate::storage::StateStore;
use crate::user_models::User;
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;

/// How passwords are kept in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStorage {
    /// Stored and compared verbatim. Compatible with existing data files.
    #[default]
    Plaintext,
    Bcrypt,
}

impl PasswordStorage {
    /// Bcrypt work runs on the blocking pool.
    async fn encode(self, password: String) -> anyhow::Result<String> {
        match self {
            Self::Plaintext => Ok(password),
            Self::Bcrypt => {
                tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
                    .await
                    .context("Password hashing task failed")?
                    .context("Failed to hash password")
            }
        }
    }

    async fn matches(self, password: String, stored: String) -> bool {
        match self {
            Self::Plaintext => password == stored,
            Self::Bcrypt => {
                tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored).unwrap_or(false))
                    .await
                    .unwrap_or(false)
            }
        }
    }
}

pub struct AuthService {
    store: Arc<StateStore>,
    passwords: PasswordStorage,
}

impl AuthService {
    pub fn new(store: Arc<StateStore>, passwords: PasswordStorage) -> Self {
        Self { store, passwords }
    }

    pub async fn signup(&self, username: String, password: String) -> Result<(), ServiceError> {
        let encoded = self.passwords.encode(password).await?;

        self.store
            .mutate(|store| {
                if store.users.iter().any(|u| u.username == username) {
                    return Err(ServiceError::DuplicateUser);
                }
                store.users.push(User::new(username.clone(), encoded));
                Ok(())
            })
            .await?;

        tracing::info!(username = %username, "User signed up");
        Ok(())
    }

    /// Succeeds when some user matches both fields. No session is created.
    ///
    /// The stored password is copied out so verification runs without
    /// holding the store lock.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ServiceError> {
        let stored = self
            .store
            .read(|store| {
                store
                    .users
                    .iter()
                    .find(|u| u.username == username)
                    .map(|u| u.password.clone())
            })
            .await;

        let valid = match stored {
            Some(stored) => self.passwords.matches(password.to_string(), stored).await,
            None => false,
        };

        if !valid {
            tracing::debug!(username = %username, "Rejected login");
            return Err(ServiceError::InvalidCredentials);
        }

        Ok(())
    }
}
