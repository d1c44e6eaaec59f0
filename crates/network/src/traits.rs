//! Traits abstraits pour la connexion streaming
//!
//! Ce module définit les interfaces que doivent implémenter les transports
//! vers l'endpoint conversationnel. La session audio ne dépend que de ces
//! traits, ce qui permet de la tester sans réseau.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{ClientMessage, NetworkResult, ServerEvent, SessionSetup};

/// Établit une connexion streaming vers l'endpoint
///
/// Implémentations disponibles :
/// - WebSocketConnector : WebSocket TLS réel avec tokio-tungstenite
/// - SimulatedConnector : Transport en mémoire pour les tests
///
/// `Send + Sync` permet de partager le connecteur entre tâches via `Arc`.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Ouvre la connexion et envoie la configuration de session
    ///
    /// Le message `setup` est toujours le premier message transmis.
    /// Un retour `Ok` signifie que le transport est établi, pas que
    /// l'endpoint a accepté la session : l'accusé arrive plus tard sous
    /// forme de `ServerEvent::Message` avec `setupComplete`.
    ///
    /// # Erreurs
    /// - `NetworkError::ConnectionFailed` : Endpoint injoignable ou refus
    /// - `NetworkError::ConfigError` : URL ou clé invalide
    async fn connect(&self, setup: &SessionSetup) -> NetworkResult<LiveLink>;
}

/// Côté émission d'une connexion établie
///
/// L'envoi n'est pas bloquant : le message est confié au transport qui
/// l'émet dans l'ordre d'appel.
pub trait LiveConnection: Send {
    /// Confie un message au transport
    ///
    /// # Erreurs
    /// - `NetworkError::Closed` : La connexion est fermée
    fn send(&self, message: ClientMessage) -> NetworkResult<()>;

    /// Ferme la connexion (idempotent)
    fn close(&mut self);

    /// Vérifie si la connexion est fermée
    fn is_closed(&self) -> bool;
}

/// Connexion établie : émission + flux d'événements de l'endpoint
pub struct LiveLink {
    pub connection: Box<dyn LiveConnection>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl std::fmt::Debug for LiveLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveLink")
            .field("closed", &self.connection.is_closed())
            .finish_non_exhaustive()
    }
}
