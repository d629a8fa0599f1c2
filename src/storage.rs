use crate::models::Clip;
use crate::user_models::User;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Complete persisted application state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

/// Durable home of the [`Store`]. Every save rewrites the whole document.
pub trait StoreBackend: Send + Sync {
    /// Returns `None` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<Store>>;

    fn save(&self, store: &Store) -> Result<()>;
}

impl<T: StoreBackend + ?Sized> StoreBackend for Arc<T> {
    fn load(&self) -> Result<Option<Store>> {
        (**self).load()
    }

    fn save(&self, store: &Store) -> Result<()> {
        (**self).save(store)
    }
}

/// Keeps the store as a single pretty-printed JSON file.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<Store>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read storage file {}", self.path.display()))?;
        let store = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse storage file {}", self.path.display()))?;
        Ok(Some(store))
    }

    fn save(&self, store: &Store) -> Result<()> {
        let json = serde_json::to_string_pretty(store)
            .context("Failed to serialize store")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write storage file {}", self.path.display()))?;
        Ok(())
    }
}

/// Backend that never touches the disk.
#[derive(Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<Store>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last store handed to `save`.
    #[cfg(test)]
    pub fn snapshot(&self) -> Option<Store> {
        self.saved.lock().ok().and_then(|s| s.clone())
    }
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Store>> {
        let saved = self.saved.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(saved.clone())
    }

    fn save(&self, store: &Store) -> Result<()> {
        let mut saved = self.saved.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        *saved = Some(store.clone());
        Ok(())
    }
}

/// In-memory store synchronized with a [`StoreBackend`].
///
/// Mutations hold the write lock across modify-and-persist, so concurrent
/// requests are applied one after another.
pub struct StateStore {
    state: RwLock<Store>,
    backend: Box<dyn StoreBackend>,
}

impl StateStore {
    /// Loads persisted state, or persists an empty store if none exists.
    /// Unparseable content is returned as an error, not repaired.
    pub fn open(backend: impl StoreBackend + 'static) -> Result<Self> {
        let state = match backend.load()? {
            Some(store) => {
                tracing::info!(
                    users = store.users.len(),
                    clips = store.clips.len(),
                    "Loaded persisted store"
                );
                store
            }
            None => {
                let store = Store::default();
                backend.save(&store)?;
                tracing::info!("Created new empty store");
                store
            }
        };

        Ok(Self {
            state: RwLock::new(state),
            backend: Box::new(backend),
        })
    }

    pub async fn read<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        let state = self.state.read().await;
        f(&*state)
    }

    /// Applies `f` to a copy and persists it. The copy replaces the live
    /// state only after a successful save, so a failure in either step
    /// leaves memory and disk as they were.
    pub async fn mutate<R, E>(&self, f: impl FnOnce(&mut Store) -> Result<R, E>) -> Result<R, E>
    where
        E: From<anyhow::Error>,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let out = f(&mut next)?;
        self.backend.save(&next)?;
        *state = next;
        Ok(out)
    }
}
