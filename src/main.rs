mod action;
mod app;
mod auth;
mod config;
mod connectivity;
mod error;
mod event;
mod feed;
mod paging;
mod pexels;
mod source;
mod tui;
mod types;
mod ui;

use std::fs::OpenOptions;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::app::App;
use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::error::FeedError;
use crate::event::Event;
use crate::feed::FeedController;
use crate::pexels::Pexels;
use crate::tui::EventHandler;

/// Browse the Pexels curated feed in the terminal
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file (default: ~/.config/photofeed/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(base_url) = args.base_url {
        config.api.base_url = base_url;
    }

    init_logging(&config)?;

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    let api_key = auth::load_api_key(&config.api)?;
    let pexels = Pexels::new(&config.api.base_url, config.api.timeout())?;
    tracing::info!(base_url = %config.api.base_url, "starting photofeed");

    let result = run(config, api_key, pexels).await;

    tui::restore()?;

    result
}

/// Log to `log_file` when configured, otherwise to stderr
fn init_logging(config: &Config) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, stderr_layer) = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

async fn run(config: Config, api_key: String, pexels: Pexels) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();

    let monitor = ConnectivityMonitor::from_config(&config.connectivity);
    tracing::debug!(online = monitor.is_connected(), probe = %config.connectivity.probe_addr, "connectivity monitor started");
    let controller = FeedController::new(config.paging.clone(), api_key, Arc::new(pexels));
    let mut view_rx = controller.subscribe();

    let (feed_tx, feed_rx) = mpsc::unbounded_channel();
    let mut app = App::new(feed_tx, controller.state().clone());
    let feed_task = tokio::spawn(controller.run(feed_rx, monitor.subscribe(), cancel.clone()));

    // Initialize terminal
    let mut terminal = tui::init()?;
    match crossterm::terminal::size() {
        Ok((width, height)) => app.update(Action::Resize(width, height)),
        Err(e) => app.update(FeedError::from(e).into()),
    }

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();

    let tick_rate = Duration::from_millis(250);
    let render_rate = Duration::from_millis(16); // ~60fps
    let mut events = EventHandler::new(tick_rate, render_rate);

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                if event.is_quit() {
                    break;
                }

                match event {
                    Event::Render => {
                        terminal.draw(|frame| ui::render(frame, &app))?;
                    }
                    Event::Tick => app.tick(),
                    _ => {
                        let action = app.handle_event(event);
                        if !matches!(action, Action::None) {
                            action_tx.send(action)?;
                        }
                    }
                }
            }
            Ok(()) = view_rx.changed() => {
                let view = view_rx.borrow_and_update().clone();
                app.set_view(view);
            }
            Some(action) = action_rx.recv() => {
                app.update(action);
            }
        }

        if app.should_quit {
            break;
        }
    }

    cancel.cancel();
    if let Err(err) = feed_task.await {
        tracing::warn!(error = %err, "feed controller task failed");
    }
    drop(monitor);

    Ok(())
}
