use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use urlencoding::encode;

use crate::client::AuthClient;
use crate::error::{Result, ThinkoraError};
use crate::paging::{ListPage, PageSource};
use crate::transport::{ApiRequest, ApiResponse};
use crate::types::{
    Category, ChatTurn, ImageRecord, Message, MessageStatus, Resolution, Role, SessionSummary,
};
use crate::validate;

const NO_CONTENT: u16 = 204;
pub const MAX_IMAGE_FREQUENCY: u8 = 4;

#[derive(Deserialize)]
struct ChatSessionsBody {
    #[serde(rename = "chatSessions", default)]
    chat_sessions: Vec<SessionSummary>,
}

#[derive(Deserialize)]
struct ChatSessionBody {
    #[serde(rename = "chatSession", default)]
    chat_session: Vec<WireTurn>,
}

#[derive(Deserialize)]
struct WireTurn {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(flatten)]
    turn: ChatTurn,
}

#[derive(Deserialize)]
struct StartedChat {
    #[serde(rename = "chatId")]
    chat_id: String,
}

#[derive(Deserialize)]
struct Generated {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ImagesBody {
    #[serde(default)]
    images: Vec<ImageRecord>,
}

#[derive(Deserialize)]
struct ImageUrls {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    urls: Vec<String>,
}

/// Typed access to the content and image endpoints.
#[derive(Debug, Clone)]
pub struct Api {
    client: AuthClient,
}

impl Api {
    pub fn new(client: AuthClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.client.request(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(response.into_error())
        }
    }

    /// Destructive calls only count once the server answers 204.
    async fn call_no_content(&self, request: ApiRequest) -> Result<()> {
        let response = self.client.request(request).await?;
        if response.status == NO_CONTENT {
            Ok(())
        } else if response.is_success() {
            Err(ThinkoraError::Server {
                status: response.status,
                message: "Deletion was not confirmed".to_string(),
            })
        } else {
            Err(response.into_error())
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.call(ApiRequest::delete("/v1/auth/logout")).await?;
        self.client.store().set_credential(None);
        Ok(())
    }

    pub async fn list_chat_sessions(
        &self,
        page: u32,
        limit: u32,
        cancel: CancellationToken,
    ) -> Result<ListPage<SessionSummary>> {
        let path = format!("/v1/content/chat-sessions/?page={}&limit={}", page, limit);
        let body: ChatSessionsBody = self
            .call(ApiRequest::get(path).with_cancel(cancel))
            .await?
            .json()?;
        Ok(ListPage::from_batch(body.chat_sessions, page, limit))
    }

    pub async fn delete_chat_session(&self, id: &str) -> Result<()> {
        let path = format!("/v1/content/chat-sessions/{}", encode(id));
        self.call_no_content(ApiRequest::delete(path)).await
    }

    /// Opens a new chat and returns its session id.
    pub async fn start_chat(&self, prompt: &str, category: Category) -> Result<String> {
        let prompt = validate::prompt(prompt)?;
        let started: StartedChat = self
            .call(
                ApiRequest::new("/v1/content/generate")
                    .json(json!({ "prompt": prompt, "category": category })),
            )
            .await?
            .json()?;
        Ok(started.chat_id)
    }

    /// Sends a prompt into an existing chat and returns the generated answer.
    pub async fn continue_chat(
        &self,
        session_id: &str,
        prompt: &str,
        category: Category,
    ) -> Result<String> {
        let prompt = validate::prompt(prompt)?;
        let path = format!("/v1/content/generate/{}", encode(session_id));
        let generated: Generated = self
            .call(ApiRequest::new(path).json(json!({ "prompt": prompt, "category": category })))
            .await?
            .json()?;
        Ok(generated.content)
    }

    /// One page of a chat, oldest message first.
    pub async fn chat_messages(
        &self,
        session_id: &str,
        page: u32,
        limit: u32,
        cancel: CancellationToken,
    ) -> Result<ListPage<Message>> {
        let path = format!(
            "/v1/content/chat-sessions/{}?page={}&limit={}",
            encode(session_id),
            page,
            limit
        );
        let body: ChatSessionBody = self
            .call(ApiRequest::get(path).with_cancel(cancel))
            .await?
            .json()?;

        let rows = body.chat_session.len();
        let messages = turns_to_messages(session_id, body.chat_session);
        let mut list = ListPage::from_batch(messages, page, limit);
        list.has_more = rows as u32 >= limit;
        Ok(list)
    }

    pub async fn image_history(
        &self,
        page: u32,
        limit: u32,
        cancel: CancellationToken,
    ) -> Result<ListPage<ImageRecord>> {
        let path = format!("/v1/image/history?page={}&limit={}", page, limit);
        let body: ImagesBody = self
            .call(ApiRequest::get(path).with_cancel(cancel))
            .await?
            .json()?;
        Ok(ListPage::from_batch(body.images, page, limit))
    }

    pub async fn image_urls(&self, id: &str) -> Result<Vec<String>> {
        let path = format!("/v1/image/history/{}", encode(id));
        let body: ImageUrls = self.call(ApiRequest::get(path)).await?.json()?;
        Ok(body.urls)
    }

    pub async fn delete_image(&self, id: &str) -> Result<()> {
        let path = format!("/v1/image/{}", encode(id));
        self.call_no_content(ApiRequest::delete(path)).await
    }

    pub async fn generate_image(
        &self,
        prompt: &str,
        resolution: Resolution,
        frequency: u8,
    ) -> Result<ImageRecord> {
        let prompt = validate::prompt(prompt)?;
        if !(1..=MAX_IMAGE_FREQUENCY).contains(&frequency) {
            return Err(ThinkoraError::Validation(format!(
                "Image count must be between 1 and {}",
                MAX_IMAGE_FREQUENCY
            )));
        }
        let body: ImageUrls = self
            .call(ApiRequest::new("/v1/image/generate").json(json!({
                "prompt": prompt,
                "resolution": resolution.as_api_str(),
                "frequency": frequency,
            })))
            .await?
            .json()?;
        Ok(ImageRecord {
            id: body.id,
            prompt: prompt.to_string(),
            urls: body.urls,
            created_at: Some(chrono::Utc::now()),
        })
    }
}

/// Rows arrive newest first. Each becomes a user message followed by the
/// answer. Rows without a server id are keyed by their content plus how many
/// identical rows came before them in the page, so refetching a page yields
/// the same ids while repeated turns stay distinct.
fn turns_to_messages(session_id: &str, rows: Vec<WireTurn>) -> Vec<Message> {
    let mut seen: HashMap<u64, usize> = HashMap::new();
    let mut messages: Vec<Message> = rows
        .into_iter()
        .flat_map(|row| {
            let turn_id = row.id.unwrap_or_else(|| {
                let mut hasher = DefaultHasher::new();
                session_id.hash(&mut hasher);
                row.turn.prompt.hash(&mut hasher);
                row.turn.content.hash(&mut hasher);
                let key = hasher.finish();
                let occurrence = seen.entry(key).or_insert(0);
                *occurrence += 1;
                format!("{:016x}-{}", key, occurrence)
            });
            let category = row.turn.category;
            // reversed below, so the answer goes first
            [
                Message {
                    id: format!("{}:content", turn_id),
                    role: Role::Ai,
                    text: row.turn.content,
                    category,
                    status: MessageStatus::Confirmed,
                },
                Message {
                    id: format!("{}:prompt", turn_id),
                    role: Role::User,
                    text: row.turn.prompt,
                    category,
                    status: MessageStatus::Confirmed,
                },
            ]
        })
        .collect();
    messages.reverse();
    messages
}

/// Pages of one chat session.
pub struct ChatPages {
    pub api: Api,
    pub session_id: String,
    pub limit: u32,
}

#[async_trait]
impl PageSource<Message> for ChatPages {
    async fn fetch(&self, page: u32, cancel: CancellationToken) -> Result<ListPage<Message>> {
        self.api
            .chat_messages(&self.session_id, page, self.limit, cancel)
            .await
    }
}

/// Pages of the sidebar session list.
pub struct SessionPages {
    pub api: Api,
    pub limit: u32,
}

#[async_trait]
impl PageSource<SessionSummary> for SessionPages {
    async fn fetch(&self, page: u32, cancel: CancellationToken) -> Result<ListPage<SessionSummary>> {
        self.api.list_chat_sessions(page, self.limit, cancel).await
    }
}

/// Pages of generated image history.
pub struct ImagePages {
    pub api: Api,
    pub limit: u32,
}

#[async_trait]
impl PageSource<ImageRecord> for ImagePages {
    async fn fetch(&self, page: u32, cancel: CancellationToken) -> Result<ListPage<ImageRecord>> {
        self.api.image_history(page, self.limit, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{signed_in, ScriptedTransport};

    fn api(transport: &std::sync::Arc<ScriptedTransport>) -> Api {
        Api::new(signed_in(transport, "t1"))
    }

    #[tokio::test]
    async fn chat_messages_are_oldest_first_pairs() {
        let transport = ScriptedTransport::new();
        transport.respond(
            200,
            r#"{"chatSession":[
                {"prompt":"second","content":"B","category":"expand"},
                {"prompt":"first","content":"A","category":"rewrite"}
            ]}"#,
        );
        let page = api(&transport)
            .chat_messages("s1", 1, 10, CancellationToken::new())
            .await
            .unwrap();

        let texts: Vec<_> = page.items.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "A", "second", "B"]);
        assert_eq!(page.items[0].role, Role::User);
        assert_eq!(page.items[1].role, Role::Ai);
        assert_eq!(page.items[2].category, Some(Category::Expand));
        assert!(!page.has_more);
        assert_eq!(
            transport.paths(),
            vec!["/v1/content/chat-sessions/s1?page=1&limit=10"]
        );
    }

    #[tokio::test]
    async fn refetched_turns_keep_their_ids() {
        let body = r#"{"chatSession":[{"prompt":"p","content":"c"}]}"#;
        let transport = ScriptedTransport::new();
        transport.respond(200, body).respond(200, body);
        let api = api(&transport);

        let a = api.chat_messages("s1", 2, 1, CancellationToken::new()).await.unwrap();
        let b = api.chat_messages("s1", 2, 1, CancellationToken::new()).await.unwrap();
        assert_eq!(a.items, b.items);
        assert!(a.has_more);
    }

    #[tokio::test]
    async fn repeated_turns_are_kept_apart() {
        let body = r#"{"chatSession":[
            {"prompt":"hi","content":"Hello!"},
            {"prompt":"hi","content":"Hello!"}
        ]}"#;
        let transport = ScriptedTransport::new();
        transport.respond(200, body).respond(200, body);
        let source = ChatPages {
            api: api(&transport),
            session_id: "s1".into(),
            limit: 10,
        };

        let mut list = crate::paging::ListController::new();
        list.load_page(&source, crate::paging::Direction::Down, 1)
            .await
            .unwrap();
        assert_eq!(list.items().len(), 4);

        // the same rows fetched again still merge onto themselves
        let again = source.fetch(1, CancellationToken::new()).await.unwrap();
        let ids: Vec<_> = list.items().iter().map(|m| m.id.clone()).collect();
        let refetched: Vec<_> = again.items.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, refetched);
    }

    #[tokio::test]
    async fn start_chat_returns_session_id() {
        let transport = ScriptedTransport::new();
        transport.respond(201, r#"{"chatId":"abc"}"#);
        let id = api(&transport).start_chat("  tidy this ", Category::Shorten).await.unwrap();
        assert_eq!(id, "abc");
        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["prompt"], "tidy this");
        assert_eq!(body["category"], "shorten");
    }

    #[tokio::test]
    async fn server_error_message_is_verbatim() {
        let transport = ScriptedTransport::new();
        transport.respond(429, r#"{"message":"Daily limit reached"}"#);
        let err = api(&transport)
            .continue_chat("s1", "again", Category::Rewrite)
            .await
            .unwrap_err();
        match err {
            ThinkoraError::Server { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Daily limit reached");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn delete_requires_no_content() {
        let transport = ScriptedTransport::new();
        transport.respond(200, "{}").respond(204, "");
        let api = api(&transport);

        assert!(api.delete_chat_session("s1").await.is_err());
        assert!(api.delete_chat_session("s1").await.is_ok());
        assert_eq!(transport.requests()[1].method, reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn session_ids_are_path_encoded() {
        let transport = ScriptedTransport::new();
        transport.respond(204, "");
        api(&transport).delete_image("a/b").await.unwrap();
        assert_eq!(transport.paths(), vec!["/v1/image/a%2Fb"]);
    }

    #[tokio::test]
    async fn generate_image_rejects_bad_frequency() {
        let transport = ScriptedTransport::new();
        let err = api(&transport)
            .generate_image("a cat", Resolution::Square, 9)
            .await
            .unwrap_err();
        assert!(matches!(err, ThinkoraError::Validation(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn generate_image_builds_record() {
        let transport = ScriptedTransport::new();
        transport.respond(201, r#"{"_id":"img1","urls":["u1","u2"]}"#);
        let rec = api(&transport)
            .generate_image("a cat", Resolution::Wide, 2)
            .await
            .unwrap();
        assert_eq!(rec.id, "img1");
        assert_eq!(rec.urls.len(), 2);
        assert_eq!(transport.requests()[0].body.as_ref().unwrap()["resolution"], "1280x720");
    }

    #[tokio::test]
    async fn logout_clears_credential_only_on_success() {
        let transport = ScriptedTransport::new();
        transport.respond(500, r#"{"message":"nope"}"#).respond(200, "{}");
        let api = api(&transport);

        assert!(api.logout().await.is_err());
        assert!(api.client().store().is_signed_in());
        api.logout().await.unwrap();
        assert!(!api.client().store().is_signed_in());
    }

    #[tokio::test]
    async fn session_pages_feed_a_controller() {
        use crate::paging::{Direction, ListController, Merge};

        let transport = ScriptedTransport::new();
        transport.respond(
            200,
            r#"{"chatSessions":[{"_id":"a","title":"A"},{"_id":"b","title":"B"}]}"#,
        );
        let source = SessionPages { api: api(&transport), limit: 2 };
        let mut list = ListController::new();
        let merge = list.load_page(&source, Direction::Down, 1).await.unwrap();
        assert_eq!(merge, Some(Merge::Applied { added: 2 }));
        assert!(list.state().has_more);
        assert_eq!(
            transport.paths(),
            vec!["/v1/content/chat-sessions/?page=1&limit=2"]
        );
    }
}
