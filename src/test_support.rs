use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::auth::SessionStore;
use crate::client::AuthClient;
use crate::error::{Result, ThinkoraError};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::Credential;

type Scripted = (Option<String>, Result<ApiResponse>);

/// In-memory transport that replays queued responses and records every
/// request it receives. Responses queued with [`respond_on`](Self::respond_on)
/// only answer requests whose path starts with the given prefix, so
/// concurrent fetches don't depend on task scheduling.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, status: u16, body: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push_back((None, Ok(ApiResponse::new(status, body))));
        self
    }

    pub(crate) fn respond_on(&self, path_prefix: &str, status: u16, body: &str) -> &Self {
        self.responses.lock().unwrap().push_back((
            Some(path_prefix.to_string()),
            Ok(ApiResponse::new(status, body)),
        ));
        self
    }

    pub(crate) fn fail(&self, err: ThinkoraError) -> &Self {
        self.responses.lock().unwrap().push_back((None, Err(err)));
        self
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let cancelled = request
            .cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled());
        let path = request.path.clone();
        self.requests.lock().unwrap().push(request);
        if cancelled {
            return Err(ThinkoraError::Cancelled);
        }

        let mut responses = self.responses.lock().unwrap();
        let position = responses.iter().position(|(prefix, _)| match prefix {
            Some(prefix) => path.starts_with(prefix.as_str()),
            None => true,
        });
        match position.and_then(|i| responses.remove(i)) {
            Some((_, response)) => response,
            None => Err(ThinkoraError::Network("no scripted response".into())),
        }
    }
}

pub(crate) fn credential(token: &str) -> Credential {
    Credential {
        subject_id: "u1".to_string(),
        display_name: "ada".to_string(),
        email: "ada@example.com".to_string(),
        token: token.to_string(),
    }
}

pub(crate) fn user_body(token: &str) -> String {
    serde_json::json!({
        "message": "ok",
        "user": {"_id": "u1", "username": "ada", "email": "ada@example.com", "token": token}
    })
    .to_string()
}

/// Store signed in with `token` plus a client over `transport`.
pub(crate) fn signed_in(transport: &Arc<ScriptedTransport>, token: &str) -> AuthClient {
    let store = SessionStore::new(transport.clone());
    store.set_credential(Some(credential(token)));
    AuthClient::new(store)
}
