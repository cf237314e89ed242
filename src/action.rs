use crate::error::Result;
use crate::paging::{ListPage, PageRequest};
use crate::scroll::ScrollMetrics;
use crate::types::{Category, Credential, ImageRecord, Message, Resolution, SessionSummary};

/// Scrollable lists the rendering layer reports metrics for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Chat,
    Sidebar,
    Images,
}

#[derive(Debug)]
pub enum Action {
    Quit,
    /// Timer tick; releases throttled scroll events.
    Tick,

    // Auth
    SignIn { email: String, password: String },
    SignedIn(Result<Credential>),
    Logout,
    LoggedOut(Result<()>),

    // Navigation
    OpenNewChat,
    OpenChat(String),
    OpenImageGenerate,
    OpenImageHistory,

    // Viewport
    Scrolled(Pane, ScrollMetrics),
    Rendered { pane: Pane, content_extent: f64, scroll_offset: f64 },
    JumpToBottom,

    // Paging; `PageRequest` carries the load id the page belongs to
    ChatPageLoaded(PageRequest, Result<ListPage<Message>>),
    SessionsPageLoaded(PageRequest, Result<ListPage<SessionSummary>>),
    ImagesPageLoaded(PageRequest, Result<ListPage<ImageRecord>>),

    // Chat
    SelectCategory(Category),
    StartChat(String),
    ChatStarted { prompt: String, result: Result<String> },
    SendPrompt(String),
    PromptAnswered {
        session_id: String,
        message_id: String,
        prompt: String,
        result: Result<String>,
    },
    DeleteSession(String),
    SessionDeleted { id: String, result: Result<()> },

    // Images
    GenerateImage { prompt: String, resolution: Resolution, frequency: u8 },
    ImageGenerated(Result<ImageRecord>),
    OpenImage(String),
    ImageOpened { id: String, result: Result<Vec<String>> },
    NextImage,
    PrevImage,
    DeleteImage(String),
    ImageDeleted { id: String, result: Result<()> },

    Error(String),
    None,
}
