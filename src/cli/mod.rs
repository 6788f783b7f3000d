//! Command-line interface parsing and startup.
//!
//! Resolves settings, installs logging, and hands the terminal to the chat
//! loop. Configuration failures do not abort startup: they are shown in the
//! chat window as a fatal error the user can only dismiss.

use std::{error::Error, path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::{info, warn};

use crate::core::config::{load_dotenv, Overrides, Settings, DEFAULT_THEME};
use crate::core::gateway::OpenAiGateway;
use crate::core::relay::StreamRelay;
use crate::core::session::ChatSession;
use crate::logging;
use crate::ui::chat_loop::{run_chat, ChatLoop};
use crate::ui::lifecycle::install_panic_hook;
use crate::ui::theme::Theme;

#[derive(Parser, Debug)]
#[command(name = "parley", version)]
#[command(about = "A terminal chat client for OpenAI-compatible APIs")]
#[command(
    long_about = "Parley is a full-screen terminal chat interface that talks to OpenAI-compatible \
completion APIs. Replies stream onto the screen as they are generated.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Your API key (required; may also come from a .env file)\n\
  OPENAI_MODEL      Model to use (optional, defaults to gpt-4o)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  PARLEY_CONFIG     Path to an alternative config.toml\n\
  PARLEY_LOG_FILE   Write diagnostic logs to this file\n\n\
Controls:\n\
  Type              Enter your message in the input field\n\
  Enter             Send the message\n\
  Backspace         Delete the last character\n\
  Esc / Ctrl+C      Quit the application"
)]
pub struct Args {
    /// Model to use for chat
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Base URL of the completion API
    #[arg(short = 'b', long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Color theme (dark or light)
    #[arg(short = 't', long, value_name = "THEME")]
    pub theme: Option<String>,

    /// Write diagnostic logs to the specified file
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Request each reply in one piece instead of streaming it
    #[arg(long)]
    pub batch: bool,
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            theme: self.theme.clone(),
            batch: self.batch,
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async_main(args));
    // An abandoned request may still be waiting on the network.
    runtime.shutdown_background();
    result
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let log_file = logging::log_path(
        args.log.clone(),
        std::env::var(logging::LOG_FILE_VAR).ok(),
    );
    logging::init(log_file.as_deref())?;
    load_dotenv(None);

    let overrides = args.overrides();
    let (chat, theme) = build_chat(&overrides);

    install_panic_hook();
    run_chat(chat, &theme).await
}

fn build_chat(overrides: &Overrides) -> (ChatLoop, Theme) {
    match Settings::load(overrides) {
        Ok(settings) => {
            info!(
                model = %settings.model,
                base_url = %settings.base_url,
                streaming = settings.mode.is_streaming(),
                "starting chat"
            );
            let gateway = OpenAiGateway::new(
                &settings.base_url,
                &settings.api_key,
                &settings.model,
                settings.mode,
            );
            let relay = StreamRelay::new(Arc::new(gateway));
            let chat = ChatLoop::new(ChatSession::new(settings.model.clone()), relay);
            (chat, Theme::from_name(&settings.theme))
        }
        Err(err) => {
            warn!(error = %err, "startup configuration failed");
            let theme = Theme::from_name(overrides.theme.as_deref().unwrap_or(DEFAULT_THEME));
            (ChatLoop::fatal(err.to_string()), theme)
        }
    }
}
