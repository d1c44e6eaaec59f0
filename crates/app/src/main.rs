// live-voice : conversation vocale temps réel avec le conseiller formation
//
// Cette application relie le micro et les haut-parleurs à l'API Live :
// - `talk` (par défaut) : démarre une session, Ctrl+C pour arrêter
// - `devices` : liste les périphériques audio disponibles

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use audio::{CpalCaptureBackend, CpalOutputBackend, DeviceDirection, list_devices};
use live::{Language, LiveAudioSession};
use network::{ConnectionConfig, WebSocketConnector};

use crate::config::{API_KEY_VARS, AppConfig, api_key_from_env};

#[derive(Parser)]
#[command(author, version, about = "Conversation vocale temps réel avec le conseiller formation Danial Steel")]
struct Cli {
    /// Fichier de configuration TOML
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Démarre une conversation (Ctrl+C pour arrêter)
    Talk {
        /// Langue de la conversation (fa, en)
        #[arg(short, long)]
        language: Option<Language>,

        /// Voix synthétique prédéfinie
        #[arg(short, long)]
        voice: Option<String>,
    },
    /// Liste les périphériques audio
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Talk { language: None, voice: None }) {
        Commands::Talk { language, voice } => {
            config.apply_overrides(language, voice);
            config.validate()?;
            run_talk(config).await
        }
        Commands::Devices => show_devices(),
    }
}

/// Lance une session et attend Ctrl+C ou la fin côté endpoint
async fn run_talk(config: AppConfig) -> Result<()> {
    let api_key = api_key_from_env()
        .with_context(|| format!("Clé d'API manquante : définissez {}", API_KEY_VARS.join(" ou ")))?;

    let connection = ConnectionConfig {
        api_key: Some(api_key),
        ..config.connection
    };
    let language = config.language;

    let mut session = LiveAudioSession::new(
        language,
        Arc::new(CpalCaptureBackend::new()),
        Arc::new(CpalOutputBackend::new()),
        Arc::new(WebSocketConnector::new(connection)),
    )
    .with_config(config.live);

    let (ended_tx, ended_rx) = oneshot::channel();
    if let Err(e) = session
        .start(move |termination| {
            let _ = ended_tx.send(termination);
        })
        .await
    {
        error!(kind = ?e.kind(), "Démarrage impossible: {}", e);
        eprintln!("❌ {}", e.user_message());
        return Err(e.into());
    }

    println!("🎙️  Session vocale démarrée ({}). Parlez !", language);
    println!("   Arrêt : Ctrl+C");

    tokio::select! {
        _ = signal::ctrl_c() => {
            println!("\n🛑 Arrêt demandé");
            session.stop();
        }
        ended = ended_rx => {
            if let Ok(termination) = ended {
                warn!("{}", termination);
                println!("🔌 Session terminée : {}", termination);
            }
        }
    }

    let stats = session.stats();
    info!(
        frames_sent = stats.frames_sent,
        frames_dropped = stats.frames_dropped,
        capture_overruns = stats.capture_overruns,
        chunks_scheduled = stats.chunks_scheduled,
        payload_errors = stats.payload_errors,
        "Bilan de session"
    );
    println!("👋 Au revoir !");
    Ok(())
}

/// Affiche les entrées et sorties audio
fn show_devices() -> Result<()> {
    let devices = list_devices()?;

    for direction in [DeviceDirection::Input, DeviceDirection::Output] {
        match direction {
            DeviceDirection::Input => println!("🎤 Entrées :"),
            DeviceDirection::Output => println!("🔊 Sorties :"),
        }

        for device in devices.iter().filter(|device| device.direction == direction) {
            let marker = if device.is_default { "*" } else { " " };
            match (device.default_sample_rate, device.default_channels) {
                (Some(rate), Some(channels)) => {
                    println!("  {} {} ({} Hz, {} canal(aux))", marker, device.name, rate, channels)
                }
                _ => println!("  {} {}", marker, device.name),
            }
        }
    }

    Ok(())
}
