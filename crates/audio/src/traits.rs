//! Traits abstraits pour le système audio
//!
//! Ce module définit les interfaces que doit fournir l'environnement audio
//! à la session Live. Elles sont injectées dans la session au lieu d'aller
//! chercher des périphériques globaux, ce qui permet d'utiliser :
//! - Les implémentations cpal (vrai matériel)
//! - Les doubles de test du module `mock` (sans matériel)

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AudioFrame, AudioResult, EncodedFrame, OutputBuffer, PlaybackId};

/// Extrémité d'envoi des frames produites par le processeur de capture
///
/// Le callback de capture utilise `try_send` : si la session ne suit pas,
/// la frame est perdue plutôt que de bloquer le thread audio.
pub type FrameSink = mpsc::Sender<AudioFrame>;

/// Couche d'accès aux périphériques de capture
///
/// `Send + Sync` : le backend est partagé entre la session et sa tâche.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Indique si l'environnement sait capturer de l'audio
    fn is_available(&self) -> bool;

    /// Demande l'accès au microphone et ouvre son flux
    ///
    /// Peut attendre indéfiniment (prompt d'autorisation).
    ///
    /// # Erreurs
    /// - `AudioError::CapabilityUnavailable` : Pas de capture dans l'environnement
    /// - `AudioError::NoDeviceFound` : Aucun microphone
    /// - `AudioError::PermissionDenied` : Accès refusé
    /// - `AudioError::DeviceBusy` : Micro utilisé par un autre processus
    async fn open_microphone(&self) -> AudioResult<Box<dyn MicrophoneStream>>;

    /// Crée un contexte de capture à la fréquence demandée
    fn create_input_context(&self, sample_rate: u32) -> AudioResult<Box<dyn InputContext>>;
}

/// Flux microphone acquis
pub trait MicrophoneStream: Send {
    /// Nom du périphérique, pour l'UI et les logs
    fn label(&self) -> String;

    /// Libère le microphone. Idempotent.
    fn close(&mut self);

    /// Vérifie si le microphone a été libéré
    fn is_closed(&self) -> bool;

    /// Accès au type concret, pour les contextes qui doivent ouvrir le matériel
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Contexte de traitement de l'entrée
///
/// Une fois attaché à un microphone, il produit en continu des frames de
/// taille fixe, mono, à sa fréquence d'échantillonnage.
pub trait InputContext: Send {
    /// Fréquence d'échantillonnage des frames produites
    fn sample_rate(&self) -> u32;

    /// Attache le microphone au processeur de frames
    ///
    /// # Arguments
    /// * `microphone` - Flux acquis par `CaptureBackend::open_microphone`
    /// * `frame_size` - Nombre d'échantillons par frame
    /// * `sink` - Destination des frames
    fn attach(&mut self, microphone: &dyn MicrophoneStream, frame_size: usize, sink: FrameSink) -> AudioResult<()>;

    /// Frames perdues parce que `sink` était plein
    fn dropped_frames(&self) -> u64;

    /// Arrête la production de frames et ferme le contexte. Idempotent.
    fn close(&mut self);

    /// Vérifie si le contexte est fermé
    fn is_closed(&self) -> bool;
}

/// Fabrique de contextes de lecture
pub trait OutputBackend: Send + Sync {
    /// Crée un contexte de lecture à la fréquence demandée
    fn create_output_context(&self, sample_rate: u32) -> AudioResult<Box<dyn OutputContext>>;
}

/// Contexte de lecture avec horloge audio
///
/// L'horloge (`current_time`) avance avec les échantillons réellement rendus.
/// Les buffers sont programmés à un instant précis de cette horloge.
pub trait OutputContext: Send {
    /// Fréquence d'échantillonnage du contexte
    fn sample_rate(&self) -> u32;

    /// Temps courant de l'horloge de sortie, en secondes
    fn current_time(&self) -> f64;

    /// Programme un buffer pour démarrer à `start_at` (secondes, horloge de sortie)
    ///
    /// # Erreurs
    /// - `AudioError::ContextClosed` : Le contexte a été fermé
    fn schedule(&mut self, buffer: OutputBuffer, start_at: f64) -> AudioResult<PlaybackId>;

    /// Arrête immédiatement un buffer programmé (joué ou non). Sans effet si inconnu.
    fn stop(&mut self, id: PlaybackId);

    /// Coupe toute lecture et ferme le contexte. Idempotent.
    fn close(&mut self);

    /// Vérifie si le contexte est fermé
    fn is_closed(&self) -> bool;
}

/// Trait pour encoder/décoder l'audio échangé avec l'endpoint
pub trait AudioCodec: Send + Sync {
    /// Encode une frame capturée pour l'envoi temps réel
    fn encode(&self, frame: &AudioFrame) -> EncodedFrame;

    /// Décode un payload audio reçu (base64) en buffer jouable
    ///
    /// # Erreurs
    /// - `AudioError::InvalidPayload` : base64 invalide
    fn decode(&self, payload: &str) -> AudioResult<OutputBuffer>;
}
