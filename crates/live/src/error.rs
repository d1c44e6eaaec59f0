//! Erreurs de la session audio
//!
//! Les erreurs bas niveau (audio, réseau) sont repliées sur une poignée de
//! catégories que l'interface peut afficher telles quelles : chacune appelle
//! une action différente de l'utilisateur.

use thiserror::Error;

use audio::AudioError;
use network::NetworkError;

/// Erreurs remontées par `LiveAudioSession::start`
#[derive(Error, Debug)]
pub enum LiveError {
    /// Une session tourne déjà sur cet objet
    #[error("Une session est déjà active")]
    AlreadyActive,

    /// L'environnement n'offre aucune capture audio
    #[error("Capture audio indisponible sur ce système")]
    CapabilityUnavailable,

    /// Aucun microphone branché
    #[error("Aucun microphone détecté")]
    DeviceNotFound,

    /// L'accès au microphone a été refusé
    #[error("Accès au microphone refusé")]
    PermissionDenied,

    /// Le microphone est déjà utilisé par un autre processus
    #[error("Microphone occupé: {0}")]
    DeviceBusy(String),

    /// Connexion à l'endpoint impossible
    #[error("Erreur de connexion: {0}")]
    Transport(#[from] NetworkError),

    /// Autre erreur audio (contexte, configuration...)
    #[error("Erreur audio: {0}")]
    Audio(AudioError),
}

/// Catégorie d'erreur destinée à l'interface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    CapabilityUnavailable,
    DeviceAbsent,
    PermissionDenied,
    DeviceBusy,
    Transport,
    Other,
}

impl LiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LiveError::CapabilityUnavailable => ErrorKind::CapabilityUnavailable,
            LiveError::DeviceNotFound => ErrorKind::DeviceAbsent,
            LiveError::PermissionDenied => ErrorKind::PermissionDenied,
            LiveError::DeviceBusy(_) => ErrorKind::DeviceBusy,
            LiveError::Transport(_) => ErrorKind::Transport,
            LiveError::AlreadyActive | LiveError::Audio(_) => ErrorKind::Other,
        }
    }

    /// Message court à montrer à l'utilisateur
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::CapabilityUnavailable => "Votre système ne permet pas la capture audio.",
            ErrorKind::DeviceAbsent => "Aucun microphone trouvé. Branchez un micro puis réessayez.",
            ErrorKind::PermissionDenied => "Autorisez l'accès au microphone puis réessayez.",
            ErrorKind::DeviceBusy => "Le microphone est utilisé par une autre application.",
            ErrorKind::Transport => "Connexion au service vocal impossible. Vérifiez votre réseau.",
            ErrorKind::Other => "La session vocale n'a pas pu démarrer.",
        }
    }
}

impl From<AudioError> for LiveError {
    fn from(error: AudioError) -> Self {
        match error {
            AudioError::CapabilityUnavailable => LiveError::CapabilityUnavailable,
            AudioError::NoDeviceFound => LiveError::DeviceNotFound,
            AudioError::PermissionDenied => LiveError::PermissionDenied,
            AudioError::DeviceBusy(detail) => LiveError::DeviceBusy(detail),
            other => LiveError::Audio(other),
        }
    }
}

pub type LiveResult<T> = Result<T, LiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_errors_fold_into_categories() {
        assert_eq!(LiveError::from(AudioError::NoDeviceFound).kind(), ErrorKind::DeviceAbsent);
        assert_eq!(LiveError::from(AudioError::PermissionDenied).kind(), ErrorKind::PermissionDenied);
        assert_eq!(
            LiveError::from(AudioError::DeviceBusy("exclusif".to_string())).kind(),
            ErrorKind::DeviceBusy
        );
        assert_eq!(
            LiveError::from(AudioError::CapabilityUnavailable).kind(),
            ErrorKind::CapabilityUnavailable
        );
        assert_eq!(LiveError::from(AudioError::ContextClosed).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_transport_error() {
        let error = LiveError::from(NetworkError::Closed);
        assert_eq!(error.kind(), ErrorKind::Transport);
        assert!(error.to_string().contains("connexion"));
    }

    #[test]
    fn test_each_category_has_distinct_message() {
        let messages = [
            LiveError::CapabilityUnavailable.user_message(),
            LiveError::DeviceNotFound.user_message(),
            LiveError::PermissionDenied.user_message(),
            LiveError::DeviceBusy(String::new()).user_message(),
            LiveError::Transport(NetworkError::Closed).user_message(),
        ];

        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
