//! Client registry lookup.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Client, ClientValidationError};

/// Read access to registered OAuth clients.
///
/// Client persistence belongs to the host system; the authorization server
/// only needs lookups by `client_id`.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Finds a client by its `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be queried.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;
}

/// Registry over a fixed set of clients.
#[derive(Debug, Default, Clone)]
pub struct InMemoryClientRegistry {
    clients: HashMap<String, Client>,
}

impl InMemoryClientRegistry {
    /// Builds a registry, validating every client.
    ///
    /// # Errors
    ///
    /// Returns the client ID and validation error of the first invalid client.
    pub fn new(
        clients: impl IntoIterator<Item = Client>,
    ) -> Result<Self, (String, ClientValidationError)> {
        let mut map = HashMap::new();
        for client in clients {
            client
                .validate()
                .map_err(|e| (client.client_id.clone(), e))?;
            map.insert(client.client_id.clone(), client);
        }
        Ok(Self { clients: map })
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).cloned())
    }
}
