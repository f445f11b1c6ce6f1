mod backend;
mod common;
mod config;
mod notify;
mod storage;
mod ui;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::mpsc;

use backend::BackendClient;
use config::AppConfig;
use ui::LobbyApp;

#[derive(Parser)]
#[command(
    name = "lobby_chat",
    version,
    about = "Single-room realtime chat for a hosted backend"
)]
struct Cli {
    /// Read environment variables from this file instead of ./.env
    #[arg(long, value_name = "FILE")]
    env_file: Option<String>,
    /// Where the local preferences file lives
    #[arg(long, default_value = storage::prefs::DEFAULT_PREFS_PATH, value_name = "FILE")]
    prefs: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_filename(path)?;
        }
        None => {
            dotenv().ok();
        }
    }
    env_logger::init();

    let config = AppConfig::from_env()?;
    if let Err(err) = storage::ensure_data_dir() {
        log::warn!("Could not create the data directory: {err}");
    }
    let prefs = storage::prefs::load(&cli.prefs);

    // UI -> backend
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // backend -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    let worker_config = config.clone();
    tokio::spawn(async move {
        let client = BackendClient::new(worker_config, event_tx, cmd_rx);
        if let Err(err) = client.run().await {
            log::error!("Backend worker terminated: {err}");
        }
    });

    let provider_label = config::provider_label(&config.oauth_provider);
    let backend_host = config.supabase_url.clone();
    let prefs_path = cli.prefs.clone();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([460.0, 680.0]),
        ..Default::default()
    };
    let mut event_rx = Some(event_rx);

    eframe::run_native(
        "Lobby",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("LobbyApp should only be initialized once");

            log::info!("Client started against {backend_host}");

            Ok(Box::new(LobbyApp::new(
                cc,
                cmd_tx.clone(),
                event_receiver,
                prefs.clone(),
                prefs_path.clone(),
                provider_label.clone(),
            )))
        }),
    )?;
    Ok(())
}
