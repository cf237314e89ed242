use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;

use crate::error::{Result, ThinkoraError};
use crate::transport::{ApiRequest, Transport};
use crate::types::{Credential, UserEnvelope};
use crate::validate;

const REFRESH_PATH: &str = "/v1/auth/refresh-token";
const SIGN_IN_PATH: &str = "/v1/auth/sign-in";
const SIGN_UP_PATH: &str = "/v1/auth/sign-up";

/// Holder of the current credential.
///
/// Cloning is cheap and every clone sees the same credential. Writes replace
/// the whole value (last write wins) and wake every subscriber, which is how
/// the rest of the client learns about refreshes and expiry.
#[derive(Clone)]
pub struct SessionStore {
    transport: Arc<dyn Transport>,
    credential: Arc<watch::Sender<Option<Credential>>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("signed_in", &self.is_signed_in())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            transport,
            credential: Arc::new(tx),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn get_credential(&self) -> Option<Credential> {
        self.credential.borrow().clone()
    }

    pub fn set_credential(&self, credential: Option<Credential>) {
        self.credential.send_replace(credential);
    }

    pub fn is_signed_in(&self) -> bool {
        self.credential.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.credential.subscribe()
    }

    /// Exchange the ambient session cookie for a fresh credential.
    ///
    /// A non-2xx answer clears the credential and yields `SessionExpired`.
    /// Transport failures are returned as-is and leave the credential alone.
    /// Concurrent refreshes are not coalesced.
    pub async fn refresh(&self) -> Result<Credential> {
        let response = self.transport.send(ApiRequest::new(REFRESH_PATH)).await?;

        if !response.is_success() {
            tracing::info!("refresh rejected with {}, signing out", response.status);
            self.set_credential(None);
            return Err(ThinkoraError::SessionExpired);
        }

        let envelope: UserEnvelope = response.json()?;
        let credential = Credential::from(envelope.user);
        self.set_credential(Some(credential.clone()));
        tracing::debug!("credential refreshed for {}", credential.display_name);
        Ok(credential)
    }

    /// Start-up probe: a valid session cookie signs the user in silently.
    pub async fn silent_login(&self) -> Option<Credential> {
        match self.refresh().await {
            Ok(credential) => Some(credential),
            Err(ThinkoraError::SessionExpired) => None,
            Err(e) => {
                tracing::warn!("silent login failed: {}", e);
                None
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Credential> {
        validate::sign_in(email, password)?;
        self.authenticate(
            SIGN_IN_PATH,
            json!({ "email": email.trim(), "password": password }),
        )
        .await
    }

    pub async fn sign_up(&self, username: &str, email: &str, password: &str) -> Result<Credential> {
        validate::sign_up(username, email, password)?;
        self.authenticate(
            SIGN_UP_PATH,
            json!({ "username": username.trim(), "email": email.trim(), "password": password }),
        )
        .await
    }

    async fn authenticate(&self, path: &str, body: serde_json::Value) -> Result<Credential> {
        let response = self.transport.send(ApiRequest::new(path).json(body)).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let envelope: UserEnvelope = response.json()?;
        let credential = Credential::from(envelope.user);
        self.set_credential(Some(credential.clone()));
        tracing::info!("signed in as {}", credential.display_name);
        Ok(credential)
    }
}
