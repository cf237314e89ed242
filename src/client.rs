use crate::auth::SessionStore;
use crate::error::Result;
use crate::transport::{ApiRequest, ApiResponse};

/// How many times one request may be replayed after a credential refresh.
pub const MAX_REFRESH_RETRIES: usize = 1;

const UNAUTHORIZED: u16 = 401;

/// Request middleware that attaches the bearer credential and recovers from
/// an expired token by refreshing and replaying the request.
///
/// Any status other than 401 is handed back untouched; callers branch on
/// [`ApiResponse::is_success`]. The only error raised for a status is
/// `SessionExpired`, when the refresh itself is rejected.
#[derive(Debug, Clone)]
pub struct AuthClient {
    store: SessionStore,
}

impl AuthClient {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut response = self.send_authorized(&request).await?;
        let mut retries = 0;

        while response.status == UNAUTHORIZED && retries < MAX_REFRESH_RETRIES {
            tracing::info!("{} {} unauthorized, refreshing", request.method, request.path);
            self.store.refresh().await?;
            retries += 1;
            response = self.send_authorized(&request).await?;
        }

        Ok(response)
    }

    async fn send_authorized(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut request = request.clone();
        match self.store.get_credential() {
            Some(credential) => {
                request = request.header("Authorization", format!("Bearer {}", credential.token));
            }
            None => {
                request
                    .headers
                    .retain(|(k, _)| !k.eq_ignore_ascii_case("Authorization"));
            }
        }
        self.store.transport().send(request).await
    }
}
