//! Crate network - Connexion streaming vers l'endpoint conversationnel
//!
//! Ce crate transporte l'audio du micro vers l'API Live et remonte les
//! réponses audio du modèle, via un WebSocket et des messages JSON.
//!
//! # Architecture
//!
//! Le crate est organisé en plusieurs modules :
//!
//! - `error` : Gestion d'erreurs avec types spécialisés réseau
//! - `types` : Messages du protocole, états de connexion, configuration
//! - `traits` : Traits abstraits connecteur/connexion
//! - `transport` : Implémentations WebSocket (réelle) et simulée
//! - `manager` : Machine d'états et file d'attente des frames sortantes
//!
//! # Examples
//!
//! ## Client basique
//!
//! ```rust,no_run
//! use network::{ConnectionConfig, ConnectionManager, LiveConnector, SessionSetup, WebSocketConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = WebSocketConnector::new(ConnectionConfig::with_api_key("..."));
//! let mut link = connector.connect(&SessionSetup::new("Réponds en français.")).await?;
//! let mut manager = ConnectionManager::new(link.connection, 32);
//!
//! while let Some(event) = link.events.recv().await {
//!     manager.on_server_event(&event)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Tests et simulation
//!
//! ```rust
//! use network::{LiveConnector, SessionSetup, SimulatedConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (connector, peer) = SimulatedConnector::new();
//! let _link = connector.connect(&SessionSetup::new("test")).await?;
//!
//! peer.accept();
//! peer.send_audio("AAA=");
//! # Ok(())
//! # }
//! ```

// Modules internes
mod error;
mod types;
mod traits;
mod transport;
mod manager;

// Re-exports publics
pub use error::{NetworkError, NetworkResult, redact_key};

pub use types::{
    ClientMessage, CloseInfo, ConnectionConfig, ConnectionState, ContentPart, GoAway, InlineData,
    ModelTurn, RealtimeInput, ResponseModality, ServerContent, ServerEvent, ServerMessage, SessionSetup,
    SetupComplete, SetupMessage, DEFAULT_MODEL, DEFAULT_VOICE, GEMINI_LIVE_URL,
};

pub use traits::{LiveConnection, LiveConnector, LiveLink};

pub use transport::{SimulatedConnector, SimulatedPeer, WebSocketConnector};

pub use manager::{ConnectionManager, ConnectionStats, OutboundQueue};

// Re-exports depuis le crate audio (pour simplicité d'utilisation)
pub use audio::EncodedFrame;

/// Version du crate network
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
