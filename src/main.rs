use std::fs::File;
use std::io::stdout;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{error, info};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};

use templot::api::{ApiClient, ApiService, HttpTransport};
use templot::app::{App, run_app_with_event_source};
use templot::event_source::TerminalEventSource;
use templot::panic_handler::initialize_panic_handler;
use templot::settings::Settings;
use templot::theme::{ThemeId, set_theme};
use templot::widget::page_view::CellMetrics;

#[derive(Parser)]
#[command(
    name = "templot",
    version,
    about = "Terminal UI for placing extraction fields on PDF templates"
)]
struct Cli {
    /// Template to open.
    template_id: i64,

    /// Server base URL; overrides the configured one.
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Session cookie value; overrides the configured one.
    #[arg(long, value_name = "VALUE")]
    session_cookie: Option<String>,

    /// CSRF token for mutating requests; overrides the configured one.
    #[arg(long, value_name = "VALUE")]
    csrf_token: Option<String>,

    /// Settings file to use instead of the platform config dir.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log file location.
    #[arg(long, value_name = "FILE", default_value = "templot.log")]
    log_file: PathBuf,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,
}

/// Terminal cell footprint in pixels, straight from the emulator when it
/// reports one.
fn detect_cell_metrics() -> CellMetrics {
    match crossterm::terminal::window_size() {
        Ok(size) if size.width > 0 && size.height > 0 && size.columns > 0 && size.rows > 0 => {
            CellMetrics {
                width_px: f64::from(size.width) / f64::from(size.columns),
                height_px: f64::from(size.height) / f64::from(size.rows),
            }
        }
        _ => CellMetrics::DEFAULT,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    WriteLogger::init(
        if cli.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        Config::default(),
        File::create(&cli.log_file)?,
    )?;

    initialize_panic_handler();

    info!("Starting templot for template {}", cli.template_id);

    let mut settings = Settings::load_or_default(cli.config.as_deref());
    if let Some(server) = cli.server {
        settings.server_url = server;
    }
    if let Some(cookie) = cli.session_cookie {
        settings.session_cookie = Some(cookie);
    }
    if let Some(token) = cli.csrf_token {
        settings.csrf_token = Some(token);
    }
    set_theme(ThemeId::from_name(&settings.theme));

    let transport = HttpTransport::new(
        settings.server_url.clone(),
        settings.csrf_token.clone(),
        settings.session_cookie.clone(),
    )?;
    let client = ApiClient::new(cli.template_id, Box::new(transport));
    let mut app = App::new(cli.template_id, settings, ApiService::new(client));
    app.set_cell_metrics(detect_cell_metrics());

    // Terminal initialization
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut events = TerminalEventSource;
    let res = run_app_with_event_source(&mut terminal, &mut app, &mut events);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("Application error: {:?}", err);
        println!("{err:?}");
    }

    info!("Shutting down templot");
    Ok(())
}
