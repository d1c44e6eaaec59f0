//! Crate audio pour la session vocale Live
//!
//! Ce crate gère toute la chaîne audio côté client :
//! - Capture microphone avec cpal, découpée en frames fixes à 16 kHz
//! - Encodage PCM 16 bits + base64 pour l'envoi, décodage de l'audio reçu
//! - Lecture programmée sur une horloge audio, sans trou ni chevauchement
//! - Doubles de test pour faire tourner une session sans matériel

pub mod config;      // Configuration audio
pub mod types;       // Types de données (AudioFrame, EncodedFrame, etc.)
pub mod traits;      // Traits abstraits (backends injectés)
pub mod capture;     // Implémentation capture avec cpal
pub mod playback;    // Implémentation lecture avec cpal
pub mod codec;       // Codec PCM 16 bits / base64
pub mod devices;     // Inventaire des périphériques
pub mod mock;        // Doubles de test
pub mod error;       // Gestion d'erreurs

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use capture::{CpalCaptureBackend, FrameAssembler};
pub use playback::CpalOutputBackend;
pub use codec::PcmCodec;
pub use devices::{list_devices, DeviceDirection, DeviceInfo};
