use std::time::Duration;
use anyhow::Result;
use ardyn_core::Config;
use clap::Parser;

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

/// Drives the typing indicator and reply pickup.
const TICK_RATE: Duration = Duration::from_millis(150);

#[derive(Parser)]
#[command(name = "ardyn")]
#[command(version, about = "Chat with an OpenAI-compatible completion endpoint from the terminal")]
struct Cli {
    /// Model identifier sent with every request
    #[arg(short, long)]
    model: Option<String>,
    /// Completion endpoint URL
    #[arg(long)]
    api_url: Option<String>,
    /// Give up on a request after this many seconds
    #[arg(short, long)]
    timeout: Option<u64>,
}

impl Cli {
    /// Flags win over environment and config file.
    fn apply(self, mut config: Config) -> Config {
        if let Some(model) = self.model {
            config.model = Some(model);
        }
        if let Some(api_url) = self.api_url {
            config.api_url = Some(api_url);
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = Some(timeout);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init()?;

    let config = Config::load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "falling back to default config");
        Config::new()
    });
    let config = cli.apply(config.with_env());
    tracing::info!(model = config.model(), has_key = config.has_api_key(), "starting");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, App::new(config)).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, mut app: App) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event)?,
            None => break,
        }
    }

    Ok(())
}
