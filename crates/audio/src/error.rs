//! Gestion d'erreurs pour le système audio
//!
//! Ce module définit tous les types d'erreurs possibles côté audio :
//! accès au microphone, contextes de capture/lecture et codec PCM.
//! Les quatre premières variantes correspondent aux situations que
//! l'utilisateur peut corriger lui-même (brancher un micro, autoriser l'accès...).

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système audio
///
/// `thiserror::Error` génère automatiquement l'implémentation du trait Error
/// et nous permet de définir des messages d'erreur avec `#[error("...")]`
#[derive(Error, Debug)]
pub enum AudioError {
    /// L'environnement n'offre aucune capacité de capture audio
    #[error("Capture audio non disponible dans cet environnement")]
    CapabilityUnavailable,

    /// Aucun périphérique audio (microphone ou haut-parleurs) n'a été trouvé
    #[error("Aucun périphérique audio trouvé")]
    NoDeviceFound,

    /// L'utilisateur ou le système a refusé l'accès au microphone
    #[error("Accès au microphone refusé")]
    PermissionDenied,

    /// Le périphérique existe mais ne peut pas être ouvert (utilisé ailleurs)
    #[error("Périphérique audio occupé ou illisible: {0}")]
    DeviceBusy(String),

    /// Erreur lors de la configuration des paramètres audio (sample rate, etc.)
    #[error("Erreur de configuration audio: {0}")]
    ConfigError(String),

    /// Payload audio reçu impossible à décoder (base64 invalide)
    #[error("Payload audio invalide: {0}")]
    InvalidPayload(String),

    /// Opération sur un contexte audio déjà fermé
    #[error("Contexte audio fermé")]
    ContextClosed,

    /// Le périphérique audio a été débranché pendant l'utilisation
    #[error("Périphérique audio déconnecté")]
    DeviceDisconnected,

    /// Erreur lors de l'initialisation d'un composant
    #[error("Erreur d'initialisation: {0}")]
    InitializationError(String),
}

/// Conversion des erreurs base64 lors du décodage des payloads serveur
impl From<base64::DecodeError> for AudioError {
    fn from(err: base64::DecodeError) -> Self {
        AudioError::InvalidPayload(err.to_string())
    }
}

/// Conversion des erreurs cpal::BuildStreamError
///
/// `DeviceNotAvailable` signifie que le micro est pris par un autre processus.
/// Les backends signalent les refus d'autorisation sous forme de message texte.
impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                AudioError::DeviceBusy("périphérique non disponible".to_string())
            }
            cpal::BuildStreamError::BackendSpecific { err } => classify_backend_message(&err.description),
            other => AudioError::ConfigError(format!("Erreur construction stream: {:?}", other)),
        }
    }
}

/// Conversion des erreurs cpal::DefaultStreamConfigError
impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                AudioError::DeviceBusy("périphérique non disponible".to_string())
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => classify_backend_message(&err.description),
            other => AudioError::ConfigError(format!("Erreur config par défaut: {:?}", other)),
        }
    }
}

/// Conversion des erreurs cpal::PlayStreamError
impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => {
                AudioError::DeviceBusy("périphérique non disponible".to_string())
            }
            cpal::PlayStreamError::BackendSpecific { err } => classify_backend_message(&err.description),
            #[allow(unreachable_patterns)]
            other => AudioError::ConfigError(format!("Erreur démarrage stream: {:?}", other)),
        }
    }
}

/// Classe un message d'erreur backend : refus d'autorisation ou périphérique occupé
fn classify_backend_message(description: &str) -> AudioError {
    let lowered = description.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not authorized") {
        AudioError::PermissionDenied
    } else {
        AudioError::DeviceBusy(description.to_string())
    }
}

/// Type Result personnalisé pour notre crate
///
/// Au lieu d'écrire Result<T, AudioError> partout, on peut écrire AudioResult<T>
pub type AudioResult<T> = Result<T, AudioError>;
