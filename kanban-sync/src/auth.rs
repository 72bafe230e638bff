//! Session/auth gate: a cached capability check for saving.
//!
//! The gate holds the last `/auth/status` answer. Reading it never touches
//! the network; only `refresh`, `login` and `logout` do.
use std::sync::{Arc, RwLock};

use crate::client::StoreClient;
use crate::error::SyncError;
use crate::protocol::AuthStatus;

/// Clones share the cached status.
#[derive(Clone)]
pub struct AuthGate {
    client: StoreClient,
    status: Arc<RwLock<AuthStatus>>,
}

impl AuthGate {
    /// Starts logged out until the first `refresh`. Pass the same client
    /// the persistence layer uses so they share the session cookie.
    pub fn new(client: StoreClient) -> Self {
        Self {
            client,
            status: Arc::new(RwLock::new(AuthStatus::default())),
        }
    }

    /// Re-query the store. Failures count as logged out.
    pub async fn refresh(&self) -> AuthStatus {
        let status = self.client.auth_status().await;
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status.clone();
        status
    }

    /// Last known status.
    pub fn status(&self) -> AuthStatus {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether saves should be attempted at all.
    pub fn can_save(&self) -> bool {
        self.status().authenticated
    }

    pub fn username(&self) -> Option<String> {
        self.status().username
    }

    pub fn login_url(&self) -> String {
        self.client.login_url()
    }

    /// Log in through the store and re-read the status.
    pub async fn login(&self) -> Result<AuthStatus, SyncError> {
        self.client.login().await?;
        Ok(self.refresh().await)
    }

    /// The cached status is cleared even when the request fails.
    pub async fn logout(&self) -> Result<(), SyncError> {
        let result = self.client.logout().await;
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = AuthStatus::default();
        result
    }
}
