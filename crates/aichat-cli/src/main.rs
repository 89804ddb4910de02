mod config;
mod speech;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use uuid::Uuid;

use aichat_api::{AuthSession, StrapiBackend, StrapiClient};
use aichat_db::{Database, DbSettingsPersistence};
use aichat_store::{
    CharacterStore, ConversationStore, Dispatcher, IdentityProvider, LoadMoreOutcome,
    SettingsStore,
};
use aichat_types::chat::ChatMessage;
use aichat_types::settings::SpeechEngine;

use crate::config::Config;
use crate::speech::LogSpeech;

#[derive(Debug, Parser)]
#[command(name = "aichat", version, about = "Chat with AI characters from the terminal.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AICHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "AICHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List the characters you can talk to
    Characters,
    /// Print the conversation with a character, oldest first
    History {
        /// Character document id
        character_id: String,
        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Send a message to a character and print the answer
    Send {
        /// Character document id
        character_id: String,
        text: String,
    },
    /// Show or change conversation settings
    Settings {
        #[arg(long)]
        language: Option<String>,
        /// Speech rate, 0.5 to 2.0
        #[arg(long)]
        speed: Option<f32>,
        #[arg(long)]
        auto_speech: Option<bool>,
        /// elevenlabs or system
        #[arg(long)]
        engine: Option<SpeechEngine>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aichat=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    debug!(?config, "Configuration loaded");

    let app = App::open(&config)?;
    match cli.command {
        Command::Login { email, password } => {
            let user = app.session.sign_in(&email, &password).await?;
            println!("Signed in as {} <{}>", user.username, user.email);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let user = app.session.register(&username, &email, &password).await?;
            println!("Registered and signed in as {}", user.username);
        }
        Command::Logout => {
            app.session.sign_out().await;
            println!("Signed out");
        }
        Command::Whoami => {
            if app.session.restore().await {
                let user = app.signed_in_user()?;
                println!("{} <{}> ({})", user.username, user.email, user.document_id);
            } else {
                println!("Not signed in");
            }
        }
        Command::Characters => app.characters().await?,
        Command::History {
            character_id,
            pages,
        } => app.history(&character_id, pages).await?,
        Command::Send { character_id, text } => app.send(&character_id, &text).await?,
        Command::Settings {
            language,
            speed,
            auto_speech,
            engine,
        } => {
            let settings = app.settings.update(|s| {
                if let Some(language) = language {
                    s.language = language;
                }
                if let Some(speed) = speed {
                    s.speed = speed;
                }
                if let Some(auto_speech) = auto_speech {
                    s.auto_speech = auto_speech;
                }
                if let Some(engine) = engine {
                    s.speech_engine = engine;
                }
            });
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}

struct App {
    page_size: u32,
    session: AuthSession,
    dispatcher: Dispatcher,
    settings: SettingsStore,
}

impl App {
    fn open(config: &Config) -> Result<Self> {
        let db = Arc::new(Database::open(&config.db_path)?);
        let client = StrapiClient::new(&config.api_url, config.http_timeout)
            .context("building HTTP client")?;
        let session = AuthSession::new(client, Some(db.clone()));

        let dispatcher = Dispatcher::new();
        let stored = db.load_settings()?.unwrap_or_default();
        let settings = SettingsStore::with_initial(
            dispatcher.clone(),
            stored,
            Some(Arc::new(DbSettingsPersistence::new(db))),
        );

        Ok(Self {
            page_size: config.page_size,
            session,
            dispatcher,
            settings,
        })
    }

    async fn require_sign_in(&self) -> Result<()> {
        if !self.session.restore().await {
            bail!("not signed in; run `aichat login` first");
        }
        Ok(())
    }

    fn signed_in_user(&self) -> Result<aichat_types::models::UserProfile> {
        self.session.current_user().context("not signed in")
    }

    fn backend(&self) -> Arc<StrapiBackend> {
        Arc::new(StrapiBackend::new(
            self.session.client().clone(),
            Arc::new(self.session.clone()),
        ))
    }

    fn conversation_store(&self) -> ConversationStore {
        ConversationStore::builder(
            self.backend(),
            Arc::new(self.session.clone()),
            self.dispatcher.clone(),
        )
        .page_size(self.page_size)
        .auto_speak(self.settings.clone(), Arc::new(LogSpeech))
        .build()
    }

    async fn characters(&self) -> Result<()> {
        self.require_sign_in().await?;
        let store = CharacterStore::new(self.backend(), self.dispatcher.clone());
        store.fetch_characters().await?;

        let selected = store.selected().map(|c| c.document_id);
        for character in store.characters() {
            let marker = if selected.as_deref() == Some(character.document_id.as_str()) {
                "*"
            } else {
                " "
            };
            println!(
                "{} {}\t{}\t{}",
                marker, character.document_id, character.name, character.introduce
            );
        }
        Ok(())
    }

    async fn history(&self, character_id: &str, pages: u32) -> Result<()> {
        self.require_sign_in().await?;
        let store = self.conversation_store();
        store.load_initial(character_id).await?;

        for _ in 1..pages {
            match store.load_more(character_id).await? {
                LoadMoreOutcome::Appended { added } => debug!(added, "Fetched older page"),
                LoadMoreOutcome::Skipped | LoadMoreOutcome::Discarded => break,
            }
        }

        let snapshot = store.snapshot();
        for message in snapshot.messages.iter().rev() {
            print_message(message);
        }
        if snapshot.has_more {
            info!("Older messages available; pass --pages to see more");
        }
        Ok(())
    }

    async fn send(&self, character_id: &str, text: &str) -> Result<()> {
        self.require_sign_in().await?;
        let store = self.conversation_store();
        store.load_initial(character_id).await?;

        let exchange = store.send_message(character_id, text, Uuid::new_v4()).await?;
        print_message(&exchange.query);
        print_message(&exchange.answer);
        Ok(())
    }
}

fn print_message(message: &ChatMessage) {
    println!(
        "[{}] {}: {}",
        message.created_at.format("%Y-%m-%d %H:%M"),
        message.author.name(),
        message.text
    );
}
