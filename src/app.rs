use std::time::Instant;

use tokio::sync::mpsc;

use crate::action::{Action, Pane};
use crate::api::{Api, ChatPages, ImagePages, SessionPages};
use crate::config::{Config, PagingConfig};
use crate::error::{Result, ThinkoraError};
use crate::images::Carousel;
use crate::paging::{Direction, ListController, ListPage, Merge, PageRequest, PageSource};
use crate::scroll::{PaginationEdge, ScrollCommand, ScrollCoordinator, ScrollMetrics};
use crate::sync::SessionListSync;
use crate::types::{Category, ImageRecord, Message, MessageStatus, Role, SessionSummary};
use crate::validate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    NewChat,
    Chat(String),
    ImageGenerate,
    ImageHistory,
}

pub struct App {
    pub screen: Screen,
    pub category: Category,

    // Active chat
    pub chat: ListController<Message>,
    pub chat_scroll: ScrollCoordinator,
    chat_dirty: bool,
    chat_extent: Option<f64>,

    // Sidebar
    pub sessions: ListController<SessionSummary>,
    pub sidebar_scroll: ScrollCoordinator,
    pub sync: SessionListSync,

    // Images
    pub images: ListController<ImageRecord>,
    pub images_scroll: ScrollCoordinator,
    pub viewer: Option<Carousel>,

    pub generating_chat: bool,
    pub generating_image: bool,
    pub notice: Option<String>,
    pub error: Option<String>,
    pub should_quit: bool,
    scroll_commands: Vec<(Pane, ScrollCommand)>,
    api: Api,
    paging: PagingConfig,
    action_tx: mpsc::UnboundedSender<Action>,
}

impl App {
    pub fn new(api: Api, config: &Config, action_tx: mpsc::UnboundedSender<Action>) -> Self {
        let screen = if api.client().store().is_signed_in() {
            Screen::NewChat
        } else {
            Screen::SignIn
        };

        Self {
            screen,
            category: Category::Rewrite,

            chat: ListController::new(),
            chat_scroll: ScrollCoordinator::new(PaginationEdge::Top, &config.scroll),
            chat_dirty: false,
            chat_extent: None,

            sessions: ListController::new(),
            sidebar_scroll: ScrollCoordinator::new(PaginationEdge::Bottom, &config.scroll),
            sync: SessionListSync::new(),

            images: ListController::new(),
            images_scroll: ScrollCoordinator::new(PaginationEdge::Bottom, &config.scroll),
            viewer: None,

            generating_chat: false,
            generating_image: false,
            notice: None,
            error: None,
            should_quit: false,
            scroll_commands: Vec::new(),
            api,
            paging: config.paging.clone(),
            action_tx,
        }
    }

    pub fn user_name(&self) -> Option<String> {
        self.api
            .client()
            .store()
            .get_credential()
            .map(|c| c.display_name)
    }

    /// Viewport changes the rendering layer should apply, oldest first.
    pub fn take_scroll_commands(&mut self) -> Vec<(Pane, ScrollCommand)> {
        std::mem::take(&mut self.scroll_commands)
    }

    pub fn update(&mut self, action: Action) {
        if action.is_user_input() {
            self.error = None;
            self.notice = None;
        }

        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::Tick => {
                self.flush_scroll(Instant::now());
            }

            // Auth
            Action::SignIn { email, password } => {
                self.spawn_sign_in(email, password);
            }
            Action::SignedIn(Ok(credential)) => {
                self.notice = Some(format!("Welcome, {}", credential.display_name));
                self.open_new_chat();
            }
            Action::Logout => {
                let api = self.api.clone();
                self.spawn(async move { Action::LoggedOut(api.logout().await) });
            }
            Action::LoggedOut(Ok(())) => {
                self.sign_out(None);
                self.notice = Some("Successfully logged out".to_string());
            }

            // Navigation
            Action::OpenNewChat => self.open_new_chat(),
            Action::OpenChat(id) => self.open_chat(id),
            Action::OpenImageGenerate => {
                self.screen = Screen::ImageGenerate;
                self.viewer = None;
                self.images.reset();
                self.images_scroll.reset();
                self.load_images(1, self.paging.image_sidebar_page_size);
            }
            Action::OpenImageHistory => {
                self.screen = Screen::ImageHistory;
                self.viewer = None;
                self.images.reset();
                self.images_scroll.reset();
                self.load_images(1, self.paging.image_history_page_size);
            }

            // Viewport
            Action::Scrolled(pane, metrics) => {
                let coordinator = match pane {
                    Pane::Chat => &mut self.chat_scroll,
                    Pane::Sidebar => &mut self.sidebar_scroll,
                    Pane::Images => &mut self.images_scroll,
                };
                if let Some(direction) = coordinator.on_scroll_metrics(metrics, Instant::now()) {
                    self.paginate(pane, direction, metrics);
                }
            }
            Action::Rendered {
                pane,
                content_extent,
                scroll_offset,
            } => {
                if pane == Pane::Chat {
                    self.chat_extent = Some(content_extent);
                }
                if pane == Pane::Chat && self.chat_dirty {
                    self.chat_dirty = false;
                    let command = self.chat_scroll.after_render(
                        self.chat.state().direction,
                        content_extent,
                        scroll_offset,
                    );
                    if command != ScrollCommand::None {
                        self.scroll_commands.push((Pane::Chat, command));
                    }
                }
            }
            Action::JumpToBottom => {
                let command = self.chat_scroll.jump_to_bottom();
                self.scroll_commands.push((Pane::Chat, command));
            }

            // Paging
            Action::ChatPageLoaded(request, result) => match self.chat.finish(&request, result) {
                Ok(Merge::Applied { .. }) => self.chat_dirty = true,
                Ok(Merge::Stale) => {}
                Err(e) => {
                    if request.direction == Direction::Up {
                        self.chat_scroll.discard_anchor();
                    }
                    self.fail(e);
                }
            },
            Action::SessionsPageLoaded(request, result) => {
                if let Err(e) = self.sessions.finish(&request, result) {
                    self.fail(e);
                }
            }
            Action::ImagesPageLoaded(request, result) => {
                if let Err(e) = self.images.finish(&request, result) {
                    self.fail(e);
                }
            }

            // Chat
            Action::SelectCategory(category) => {
                self.category = category;
            }
            Action::StartChat(text) => self.start_chat(text),
            Action::ChatStarted {
                prompt,
                result: Ok(id),
            } => {
                self.generating_chat = false;
                self.sync.record_activity(&mut self.sessions, &id, &prompt);
                self.open_chat(id);
            }
            Action::SendPrompt(text) => self.send_prompt(text),
            Action::PromptAnswered {
                session_id,
                message_id,
                prompt,
                result,
            } => self.on_prompt_answered(session_id, message_id, prompt, result),
            Action::DeleteSession(id) => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.delete_chat_session(&id).await;
                    Action::SessionDeleted { id, result }
                });
            }
            Action::SessionDeleted { id, result: Ok(()) } => {
                let removal = self.sync.remove(&mut self.sessions, &id);
                if removal.navigate_away {
                    self.open_new_chat();
                }
                self.notice = Some("Deletion successful".to_string());
            }

            // Images
            Action::GenerateImage {
                prompt,
                resolution,
                frequency,
            } => {
                if self.generating_image {
                    return;
                }
                self.generating_image = true;
                self.viewer = None;
                let api = self.api.clone();
                self.spawn(async move {
                    Action::ImageGenerated(api.generate_image(&prompt, resolution, frequency).await)
                });
            }
            Action::ImageGenerated(Ok(record)) => {
                self.generating_image = false;
                self.viewer = Some(Carousel::new(record.id.clone(), record.urls.clone()));
                self.images.prepend_local(record);
            }
            Action::OpenImage(id) => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.image_urls(&id).await;
                    Action::ImageOpened { id, result }
                });
            }
            Action::ImageOpened { id, result: Ok(urls) } => {
                self.viewer = Some(Carousel::new(id, urls));
            }
            Action::NextImage => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.next();
                }
            }
            Action::PrevImage => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.prev();
                }
            }
            Action::DeleteImage(id) => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = api.delete_image(&id).await;
                    Action::ImageDeleted { id, result }
                });
            }
            Action::ImageDeleted { id, result: Ok(()) } => {
                self.images.remove(&id);
                if self.viewer.as_ref().is_some_and(|v| v.record_id == id) {
                    self.viewer = None;
                }
                self.notice = Some("Image deleted successfully".to_string());
            }

            // Failures of the actions above
            Action::SignedIn(Err(e))
            | Action::LoggedOut(Err(e))
            | Action::SessionDeleted { result: Err(e), .. }
            | Action::ImageOpened { result: Err(e), .. }
            | Action::ImageDeleted { result: Err(e), .. } => self.fail(e),
            Action::ChatStarted { result: Err(e), .. } => {
                self.generating_chat = false;
                self.fail(e);
            }
            Action::ImageGenerated(Err(e)) => {
                self.generating_image = false;
                self.fail(e);
            }

            Action::Error(msg) => {
                self.error = Some(msg);
            }
            Action::None => {}
        }
    }

    fn open_new_chat(&mut self) {
        self.chat.reset();
        self.chat_scroll.reset();
        self.chat_dirty = false;
        self.chat_extent = None;
        self.sync.set_open(None);
        self.screen = Screen::NewChat;
        self.ensure_sessions_loaded();
    }

    fn open_chat(&mut self, id: String) {
        self.chat.reset();
        self.chat_scroll.reset();
        self.chat_dirty = false;
        self.chat_extent = None;
        self.sync.set_open(Some(id.clone()));
        self.screen = Screen::Chat(id);
        self.ensure_sessions_loaded();
        self.load_chat(Direction::Down, 1, None);
    }

    fn ensure_sessions_loaded(&mut self) {
        let state = self.sessions.state();
        if state.page == 0 && !state.loading_newer {
            self.load_sessions(1);
        }
    }

    fn sign_out(&mut self, reason: Option<String>) {
        self.api.client().store().set_credential(None);
        self.chat.reset();
        self.chat_scroll.reset();
        self.chat_dirty = false;
        self.chat_extent = None;
        self.sessions.reset();
        self.sidebar_scroll.reset();
        self.sync.set_open(None);
        self.images.reset();
        self.images_scroll.reset();
        self.viewer = None;
        self.generating_chat = false;
        self.generating_image = false;
        self.screen = Screen::SignIn;
        self.error = reason;
    }

    fn fail(&mut self, err: ThinkoraError) {
        if err.is_session_expired() {
            self.sign_out(Some("Session expired, please sign in again".to_string()));
            return;
        }
        match err {
            ThinkoraError::Cancelled => {
                tracing::debug!("request cancelled");
            }
            other => {
                tracing::warn!("{}", other);
                self.error = Some(other.to_string());
            }
        }
    }

    fn paginate(&mut self, pane: Pane, direction: Direction, metrics: ScrollMetrics) {
        match (pane, direction) {
            (Pane::Chat, Direction::Up) if self.chat.state().page >= 1 => {
                let page = self.chat.next_page();
                let extent = self.chat_extent.unwrap_or(metrics.content_extent);
                self.load_chat(Direction::Up, page, Some(extent));
            }
            (Pane::Sidebar, Direction::Down) if self.sessions.state().page >= 1 => {
                let page = self.sessions.next_page();
                self.load_sessions(page);
            }
            (Pane::Images, Direction::Down) if self.images.state().page >= 1 => {
                let page = self.images.next_page();
                let limit = match self.screen {
                    Screen::ImageHistory => self.paging.image_history_page_size,
                    _ => self.paging.image_sidebar_page_size,
                };
                self.load_images(page, limit);
            }
            _ => {}
        }
    }

    fn flush_scroll(&mut self, now: Instant) {
        if let Some((direction, metrics)) = self.chat_scroll.poll(now) {
            self.paginate(Pane::Chat, direction, metrics);
        }
        if let Some((direction, metrics)) = self.sidebar_scroll.poll(now) {
            self.paginate(Pane::Sidebar, direction, metrics);
        }
        if let Some((direction, metrics)) = self.images_scroll.poll(now) {
            self.paginate(Pane::Images, direction, metrics);
        }
    }

    fn load_chat(&mut self, direction: Direction, page: u32, anchor_extent: Option<f64>) {
        let Screen::Chat(session_id) = &self.screen else {
            return;
        };
        let source = ChatPages {
            api: self.api.clone(),
            session_id: session_id.clone(),
            limit: self.paging.chat_page_size,
        };
        let Some(request) = self.chat.begin(direction, page) else {
            return;
        };
        if let Some(extent) = anchor_extent {
            self.chat_scroll.capture_anchor(extent);
        }
        self.spawn_page(source, request, Action::ChatPageLoaded);
    }

    fn load_sessions(&mut self, page: u32) {
        let Some(request) = self.sessions.begin(Direction::Down, page) else {
            return;
        };
        let source = SessionPages {
            api: self.api.clone(),
            limit: self.paging.session_page_size,
        };
        self.spawn_page(source, request, Action::SessionsPageLoaded);
    }

    fn load_images(&mut self, page: u32, limit: u32) {
        let Some(request) = self.images.begin(Direction::Down, page) else {
            return;
        };
        let source = ImagePages {
            api: self.api.clone(),
            limit,
        };
        self.spawn_page(source, request, Action::ImagesPageLoaded);
    }

    fn start_chat(&mut self, text: String) {
        if self.generating_chat {
            return;
        }
        let prompt = match validate::prompt(&text) {
            Ok(p) => p.to_string(),
            Err(e) => return self.fail(e),
        };
        self.generating_chat = true;
        let api = self.api.clone();
        let category = self.category;
        self.spawn(async move {
            let result = api.start_chat(&prompt, category).await;
            Action::ChatStarted { prompt, result }
        });
    }

    fn send_prompt(&mut self, text: String) {
        let Screen::Chat(session_id) = self.screen.clone() else {
            return;
        };
        if self.generating_chat {
            return;
        }
        let prompt = match validate::prompt(&text) {
            Ok(p) => p.to_string(),
            Err(e) => return self.fail(e),
        };

        let message = Message::pending_user(prompt.clone(), self.category);
        let message_id = message.id.clone();
        self.chat.append_local(message);
        self.chat_dirty = true;
        self.generating_chat = true;

        let api = self.api.clone();
        let category = self.category;
        self.spawn(async move {
            let result = api.continue_chat(&session_id, &prompt, category).await;
            Action::PromptAnswered {
                session_id,
                message_id,
                prompt,
                result,
            }
        });
    }

    fn on_prompt_answered(
        &mut self,
        session_id: String,
        message_id: String,
        prompt: String,
        result: Result<String>,
    ) {
        self.generating_chat = false;
        let is_open = self.sync.open_session() == Some(session_id.as_str());

        match result {
            Ok(content) => {
                if is_open {
                    let mut category = None;
                    self.chat.update(&message_id, |m| {
                        m.status = MessageStatus::Confirmed;
                        category = m.category;
                    });
                    if !content.trim().is_empty() {
                        self.chat
                            .append_local(Message::confirmed(Role::Ai, content, category));
                    }
                    self.chat_dirty = true;
                }
                self.sync
                    .record_activity(&mut self.sessions, &session_id, &prompt);
            }
            Err(e) => {
                if is_open {
                    self.chat
                        .update(&message_id, |m| m.status = MessageStatus::Failed);
                }
                self.fail(e);
            }
        }
    }

    fn spawn_sign_in(&self, email: String, password: String) {
        let store = self.api.client().store().clone();
        self.spawn(async move { Action::SignedIn(store.sign_in(&email, &password).await) });
    }

    fn spawn_page<T, S>(
        &self,
        source: S,
        request: PageRequest,
        done: fn(PageRequest, Result<ListPage<T>>) -> Action,
    ) where
        T: Send + 'static,
        S: PageSource<T> + 'static,
    {
        self.spawn(async move {
            let result = source.fetch(request.page, request.cancel.clone()).await;
            done(request, result)
        });
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = Action> + Send + 'static,
    {
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            tx.send(task.await).ok();
        });
    }
}

impl Action {
    fn is_user_input(&self) -> bool {
        matches!(
            self,
            Action::SignIn { .. }
                | Action::Logout
                | Action::OpenNewChat
                | Action::OpenChat(_)
                | Action::OpenImageGenerate
                | Action::OpenImageHistory
                | Action::StartChat(_)
                | Action::SendPrompt(_)
                | Action::DeleteSession(_)
                | Action::GenerateImage { .. }
                | Action::OpenImage(_)
                | Action::DeleteImage(_)
        )
    }
}
