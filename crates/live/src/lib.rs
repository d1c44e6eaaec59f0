//! Crate live - Session de conversation vocale temps réel
//!
//! Ce crate assemble le crate `audio` (micro, lecture, codec PCM) et le
//! crate `network` (connexion streaming) en une session unique :
//!
//! - le micro est capturé en frames de 4096 échantillons à 16 kHz,
//!   encodées en PCM 16 bits base64 et envoyées à l'endpoint
//! - l'audio synthétisé (PCM 16 bits à 24 kHz) est programmé bord à bord
//!   sur l'horloge du contexte de sortie
//! - `start()` acquiert tout, `stop()` libère tout
//!
//! # Modules
//!
//! - `config` : Configuration de session, langue et instruction système
//! - `error` : Catégories d'erreurs présentables à l'utilisateur
//! - `scheduler` : Calcul des instants de démarrage de la lecture
//! - `session` : Cycle de vie de la session

pub mod config;
pub mod error;
pub mod scheduler;
pub mod session;

pub use config::{Language, LiveConfig};
pub use error::{ErrorKind, LiveError, LiveResult};
pub use scheduler::PlaybackScheduler;
pub use session::{LiveAudioSession, SessionStats, TerminateCallback, Termination};

/// Version du crate live
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
