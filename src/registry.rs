// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named sessions with an explicit lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::session::{Session, SessionSettings};
use crate::transport::Transport;

/// Alias to session map, shared by reference with whatever needs it.
///
/// Sessions are handed out as `Arc`s; removing one closes it, and holders
/// of a clone see a disconnected session afterwards.
pub struct SessionRegistry<T: Transport> {
    sessions: RwLock<HashMap<String, Arc<Session<T>>>>,
}

impl<T: Transport> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new, not yet connected session under `alias`.
    pub async fn create(
        &self,
        alias: &str,
        transport: T,
        settings: SessionSettings,
    ) -> Result<Arc<Session<T>>, RegistryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(alias) {
            return Err(RegistryError::AlreadyExists {
                alias: alias.to_string(),
            });
        }
        let session = Arc::new(Session::new(transport, settings));
        sessions.insert(alias.to_string(), Arc::clone(&session));
        debug!("Registered session '{}' for {}", alias, session.identity());
        Ok(session)
    }

    pub async fn get(&self, alias: &str) -> Result<Arc<Session<T>>, RegistryError> {
        self.sessions
            .read()
            .await
            .get(alias)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                alias: alias.to_string(),
            })
    }

    pub async fn contains(&self, alias: &str) -> bool {
        self.sessions.read().await.contains_key(alias)
    }

    /// Unregister and close the session under `alias`.
    pub async fn remove(&self, alias: &str) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(alias)
            .ok_or_else(|| RegistryError::NotFound {
                alias: alias.to_string(),
            })?;
        if let Err(e) = session.close().await {
            warn!("Error closing session '{}': {}", alias, e);
        }
        info!("Removed session '{}'", alias);
        Ok(())
    }

    /// Registered aliases, sorted.
    pub async fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Close and drop every session.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<Session<T>>)> =
            self.sessions.write().await.drain().collect();
        for (alias, session) in drained {
            if let Err(e) = session.close().await {
                warn!("Error closing session '{}': {}", alias, e);
            }
        }
    }
}
