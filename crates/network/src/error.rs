//! Gestion d'erreurs pour la connexion streaming
//!
//! Ce module définit les erreurs possibles entre le client et l'endpoint
//! conversationnel. Il suit les mêmes patterns que le module audio pour la
//! cohérence du code.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Énumération de toutes les erreurs possibles côté connexion
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Impossible d'établir la connexion avec l'endpoint
    #[error("Connexion impossible vers {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Erreur du protocole WebSocket
    #[error("Erreur WebSocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Erreur lors de la sérialisation/désérialisation des messages JSON
    #[error("Erreur de sérialisation: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// La connexion est fermée, plus aucun message ne peut partir
    #[error("Connexion fermée")]
    Closed,

    /// Opération tentée alors que la connexion n'est pas dans le bon état
    #[error("Opération {operation} invalide dans l'état {current_state}")]
    InvalidState { operation: String, current_state: String },

    /// Erreur de configuration (URL, clé d'API...)
    #[error("Configuration réseau invalide: {0}")]
    ConfigError(String),
}

/// Type Result personnalisé pour notre crate network
pub type NetworkResult<T> = Result<T, NetworkError>;

impl NetworkError {
    /// Crée une erreur de connexion avec contexte
    ///
    /// La clé d'API éventuellement présente dans l'URL est masquée.
    pub fn connection_failed(url: &str, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            url: redact_key(url),
            reason: reason.to_string(),
        }
    }

    /// Crée une erreur d'état invalide
    pub fn invalid_state(operation: &str, current_state: impl ToString) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            current_state: current_state.to_string(),
        }
    }
}

/// Masque la valeur du paramètre `key=` d'une URL
pub fn redact_key(url: &str) -> String {
    match url.find("key=") {
        Some(index) => {
            let value_start = index + "key=".len();
            let value_end = url[value_start..]
                .find('&')
                .map(|offset| value_start + offset)
                .unwrap_or(url.len());
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NetworkError::connection_failed("wss://example.test/ws", "refusée");
        assert!(error.to_string().contains("wss://example.test/ws"));
        assert!(error.to_string().contains("refusée"));
    }

    #[test]
    fn test_key_is_redacted() {
        assert_eq!(redact_key("wss://h/ws?key=SECRET"), "wss://h/ws?key=***");
        assert_eq!(redact_key("wss://h/ws?key=SECRET&alt=json"), "wss://h/ws?key=***&alt=json");
        assert_eq!(redact_key("wss://h/ws"), "wss://h/ws");

        let error = NetworkError::connection_failed("wss://h/ws?key=SECRET", "timeout");
        assert!(!error.to_string().contains("SECRET"));
    }

    #[test]
    fn test_invalid_state_helper() {
        match NetworkError::invalid_state("send", "Closed") {
            NetworkError::InvalidState { operation, current_state } => {
                assert_eq!(operation, "send");
                assert_eq!(current_state, "Closed");
            }
            _ => panic!("Wrong error type"),
        }
    }
}
