use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ThinkoraError};

/// A request against the backend, relative to the configured base url.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    pub cancel: Option<CancellationToken>,
}

impl ApiRequest {
    /// POST unless changed, with a JSON content type the caller may override.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: None,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path).method(Method::GET)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(path).method(Method::DELETE)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a header, replacing any existing one with the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The `{message}` of an error body, or the status reason when absent.
    pub fn error_message(&self) -> String {
        if let Ok(err) = serde_json::from_str::<ErrorBody>(&self.body) {
            return err.message;
        }
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }

    pub fn into_error(self) -> ThinkoraError {
        ThinkoraError::Server {
            status: self.status,
            message: self.error_message(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// reqwest-backed transport. The cookie store plays the part of the
/// browser's ambient cookies, so the refresh cookie set at sign-in is
/// replayed to the refresh endpoint.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path));
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        tracing::debug!("{} {}", request.method, request.path);

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, ThinkoraError>(ApiResponse { status, body })
        };

        match request.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(ThinkoraError::Cancelled),
                result = exchange => result,
            },
            None => exchange.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_header_overrides_default_content_type() {
        let req = ApiRequest::new("/x").header("content-type", "text/plain");
        assert_eq!(req.header_value("Content-Type"), Some("text/plain"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn default_method_is_post() {
        assert_eq!(ApiRequest::new("/x").method, Method::POST);
        assert_eq!(ApiRequest::get("/x").method, Method::GET);
    }

    #[test]
    fn error_message_prefers_body() {
        let res = ApiResponse::new(400, r#"{"message":"Prompt is required"}"#);
        assert_eq!(res.error_message(), "Prompt is required");
    }

    #[test]
    fn error_message_falls_back_to_reason() {
        assert_eq!(ApiResponse::new(502, "<html>").error_message(), "Bad Gateway");
        assert_eq!(ApiResponse::new(599, "").error_message(), "HTTP 599");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let t = HttpTransport::new("http://localhost:3000/").unwrap();
        assert_eq!(t.url("/v1/auth/logout"), "http://localhost:3000/v1/auth/logout");
    }
}
