mod action;
mod api;
mod app;
mod auth;
mod client;
mod config;
mod error;
mod images;
mod paging;
mod scroll;
mod sync;
#[cfg(test)]
mod test_support;
mod transport;
mod types;
mod validate;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::{Action, Pane};
use crate::api::{Api, ImagePages, SessionPages};
use crate::app::{App, Screen};
use crate::auth::SessionStore;
use crate::client::AuthClient;
use crate::config::Config;
use crate::error::ThinkoraError;
use crate::paging::{Direction, ListController};
use crate::scroll::ScrollMetrics;
use crate::transport::HttpTransport;
use crate::types::{Category, ImageRecord, Resolution, Role, SessionSummary};

#[derive(Parser)]
#[command(name = "thinkora")]
#[command(about = "Chat and image generation client for Thinkora", version)]
struct Cli {
    /// Server base url; overrides the config file
    #[arg(long)]
    base_url: Option<String>,

    /// Sign in with this email when no session cookie is available.
    /// The password is read from THINKORA_PASSWORD or prompted for.
    #[arg(short, long, global = true)]
    email: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the credentials and print the signed-in user
    SignIn,
    /// Create an account
    SignUp {
        #[arg(short, long)]
        username: String,
    },
    /// End the server session
    Logout,
    /// List chat sessions, most recent first
    Sessions {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Delete a chat session
    DeleteSession { id: String },
    /// Interactive chat
    Chat {
        /// Continue an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,
        #[arg(short, long, default_value = "rewrite")]
        category: Category,
    },
    /// Generated image history, grouped by day
    Images {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Generate images from a prompt
    GenerateImage {
        prompt: String,
        #[arg(short, long, default_value = "1024x1024")]
        resolution: Resolution,
        /// Number of images, 1 to 4
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u8,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load();
    if let Some(base_url) = cli.base_url.clone() {
        config.general.base_url = base_url;
    }

    let transport = Arc::new(HttpTransport::new(config.general.base_url.clone())?);
    let store = SessionStore::new(transport);

    if let Commands::SignUp { username } = &cli.command {
        let email = cli
            .email
            .clone()
            .ok_or_else(|| ThinkoraError::Validation("--email is required".to_string()))?;
        let password = read_password().await?;
        let credential = store.sign_up(username, &email, &password).await?;
        println!("Signed up as {}", credential.display_name);
        return Ok(());
    }

    connect(&store, cli.email.as_deref()).await?;
    let api = Api::new(AuthClient::new(store));

    match cli.command {
        Commands::SignUp { .. } => {}
        Commands::SignIn => {
            if let Some(credential) = api.client().store().get_credential() {
                println!(
                    "Signed in as {} <{}> ({})",
                    credential.display_name, credential.email, credential.subject_id
                );
            }
        }
        Commands::Logout => {
            api.logout().await?;
            println!("Successfully logged out");
        }
        Commands::Sessions { page } => {
            let source = SessionPages {
                api,
                limit: config.paging.session_page_size,
            };
            let mut list: ListController<SessionSummary> = ListController::new();
            list.load_page(&source, Direction::Down, page).await?;
            for session in list.items() {
                println!("{}  {}", session.id, session.title);
            }
            if list.state().has_more {
                println!("-- more on page {} --", page + 1);
            }
        }
        Commands::DeleteSession { id } => {
            api.delete_chat_session(&id).await?;
            println!("Deletion successful");
        }
        Commands::Images { page } => {
            let source = ImagePages {
                api,
                limit: config.paging.image_history_page_size,
            };
            let mut list: ListController<ImageRecord> = ListController::new();
            list.load_page(&source, Direction::Down, page).await?;
            let today = images::today();
            for group in images::group_by_date(list.items()) {
                println!("{}", group.label(today));
                for record in group.records {
                    println!("  {}  {} ({} images)", record.id, record.prompt, record.urls.len());
                }
            }
        }
        Commands::GenerateImage {
            prompt,
            resolution,
            count,
        } => {
            let record = api.generate_image(&prompt, resolution, count).await?;
            for url in &record.urls {
                println!("{}", url);
            }
        }
        Commands::Chat { session, category } => {
            run_chat(api, &config, session, category).await?;
        }
    }

    Ok(())
}

/// Restore the session from the refresh cookie, falling back to a password
/// sign-in when an email was given.
async fn connect(store: &SessionStore, email: Option<&str>) -> Result<(), ThinkoraError> {
    if store.silent_login().await.is_some() {
        return Ok(());
    }
    let Some(email) = email else {
        return Err(ThinkoraError::Validation(
            "Not signed in; pass --email to sign in".to_string(),
        ));
    };
    let password = read_password().await?;
    store.sign_in(email, &password).await?;
    Ok(())
}

async fn read_password() -> Result<String, ThinkoraError> {
    if let Ok(password) = std::env::var("THINKORA_PASSWORD") {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_chat(
    api: Api,
    config: &Config,
    session: Option<String>,
    category: Category,
) -> Result<(), Box<dyn std::error::Error>> {
    // Create action channel
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();

    let mut credentials = api.client().store().subscribe();
    let mut app = App::new(api, config, action_tx.clone());
    app.update(Action::SelectCategory(category));
    match session {
        Some(id) => app.update(Action::OpenChat(id)),
        None => app.update(Action::OpenNewChat),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(config.scroll.throttle().max(Duration::from_millis(50)));
    let mut view = ChatView::default();

    eprintln!("Type a prompt, or /help for commands.");

    // Main loop
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let action = parse_line(&app, &line);
                if !matches!(action, Action::None) {
                    action_tx.send(action)?;
                }
            }
            Some(action) = action_rx.recv() => {
                app.update(action);
                view.render(&mut app);
            }
            _ = tick.tick() => {
                app.update(Action::Tick);
            }
            Ok(()) = credentials.changed() => {
                if let Some(credential) = credentials.borrow_and_update().clone() {
                    tracing::info!("credential refreshed for {}", credential.display_name);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    if let Some(error) = &app.error {
        eprintln!("{}", error);
    }
    Ok(())
}

const HELP: &str = "\
/new                      start a new chat
/open <id>                open a chat
/delete <id>              delete a chat
/older                    load older messages
/bottom                   jump to the newest message
/sessions                 list loaded sessions
/more-sessions            load the next page of sessions
/category <name>          rewrite, expand, shorten, article or summary
/images                   image history
/generate [prompt]        image screen, or generate from a prompt
/more-images              load the next page of images
/view <id>                show an image record
/next  /prev              step through its images
/delete-image <id>        delete an image record
/signin <email> <pass>    sign in again
/logout  /quit";

/// What a reached list edge looks like to the scroll coordinator. A line
/// terminal has no viewport, so paging is asked for this way.
fn edge_reached(pane: Pane, extent: f64) -> Action {
    let metrics = match pane {
        Pane::Chat => ScrollMetrics {
            offset_top: 0.0,
            offset_bottom: extent,
            content_extent: extent,
        },
        Pane::Sidebar | Pane::Images => ScrollMetrics {
            offset_top: extent,
            offset_bottom: 0.0,
            content_extent: extent,
        },
    };
    Action::Scrolled(pane, metrics)
}

fn parse_line(app: &App, line: &str) -> Action {
    let line = line.trim();
    let (name, arg) = match line.strip_prefix('/') {
        Some(command) => command.split_once(' ').unwrap_or((command, "")),
        None if line.is_empty() => return Action::None,
        None => {
            return match app.screen {
                Screen::SignIn => Action::Error("Sign in first: /signin <email> <password>".into()),
                Screen::Chat(_) => Action::SendPrompt(line.to_string()),
                _ => Action::StartChat(line.to_string()),
            };
        }
    };
    let arg = arg.trim();

    match name {
        "quit" | "q" => Action::Quit,
        "signin" => match arg.split_once(' ') {
            Some((email, password)) => Action::SignIn {
                email: email.to_string(),
                password: password.trim().to_string(),
            },
            None => Action::Error("usage: /signin <email> <password>".into()),
        },
        "logout" => Action::Logout,
        "new" => Action::OpenNewChat,
        "open" if !arg.is_empty() => Action::OpenChat(arg.to_string()),
        "delete" if !arg.is_empty() => Action::DeleteSession(arg.to_string()),
        "category" => match arg.parse::<Category>() {
            Ok(category) => Action::SelectCategory(category),
            Err(e) => Action::Error(e),
        },
        "older" => edge_reached(Pane::Chat, app.chat.items().len() as f64),
        "bottom" => Action::JumpToBottom,
        "sessions" => {
            for session in app.sessions.items() {
                println!("  {}  {}", session.id, session.title);
            }
            Action::None
        }
        "more-sessions" => edge_reached(Pane::Sidebar, app.sessions.items().len() as f64),
        "images" => Action::OpenImageHistory,
        "generate" if arg.is_empty() => Action::OpenImageGenerate,
        "generate" => Action::GenerateImage {
            prompt: arg.to_string(),
            resolution: Resolution::Square,
            frequency: 1,
        },
        "more-images" => edge_reached(Pane::Images, app.images.items().len() as f64),
        "view" if !arg.is_empty() => Action::OpenImage(arg.to_string()),
        "next" => Action::NextImage,
        "prev" => Action::PrevImage,
        "delete-image" if !arg.is_empty() => Action::DeleteImage(arg.to_string()),
        _ => {
            println!("{}", HELP);
            Action::None
        }
    }
}

/// Prints what changed in the app after each update.
#[derive(Default)]
struct ChatView {
    screen: Option<Screen>,
    printed: HashSet<String>,
    images: HashSet<String>,
    showing: Option<String>,
    affordance: bool,
    error: Option<String>,
    notice: Option<String>,
}

impl ChatView {
    fn render(&mut self, app: &mut App) {
        if self.screen.as_ref() != Some(&app.screen) {
            self.printed.clear();
            self.images.clear();
            match &app.screen {
                Screen::SignIn => println!("== signed out; /signin <email> <password> =="),
                Screen::NewChat => println!(
                    "== new chat as {} ({}) ==",
                    app.user_name().unwrap_or_default(),
                    app.category
                ),
                Screen::Chat(id) => println!("== chat {} ==", id),
                Screen::ImageGenerate | Screen::ImageHistory => println!("== images =="),
            }
            self.screen = Some(app.screen.clone());
        }

        let fresh: Vec<_> = app
            .chat
            .items()
            .iter()
            .filter(|m| !self.printed.contains(&m.id))
            .cloned()
            .collect();
        for message in &fresh {
            let who = match message.role {
                Role::User => "you",
                Role::Ai => "ai",
            };
            println!("[{}] {}", who, message.text);
            self.printed.insert(message.id.clone());
        }

        for record in app.images.items() {
            if self.images.insert(record.id.clone()) {
                println!("  {}  {} ({} images)", record.id, record.prompt, record.urls.len());
            }
        }

        let showing = app
            .viewer
            .as_ref()
            .and_then(|v| v.current().map(|url| format!("{}: {}", v.record_id, url)));
        if showing != self.showing {
            if let Some(line) = &showing {
                println!("[image] {}", line);
            }
            self.showing = showing;
        }

        let affordance = app.chat_scroll.is_scroll_affordance_visible();
        if affordance && !self.affordance {
            println!("-- new content below, /bottom to jump --");
        }
        self.affordance = affordance;

        if app.error != self.error {
            if let Some(error) = &app.error {
                eprintln!("! {}", error);
            }
            self.error = app.error.clone();
        }
        if app.notice != self.notice {
            if let Some(notice) = &app.notice {
                println!("{}", notice);
            }
            self.notice = app.notice.clone();
        }

        let extent = app.chat.items().len() as f64;
        app.update(Action::Rendered {
            pane: Pane::Chat,
            content_extent: extent,
            scroll_offset: 0.0,
        });
        for (pane, command) in app.take_scroll_commands() {
            tracing::debug!("{:?} scroll {:?}", pane, command);
        }
    }
}
