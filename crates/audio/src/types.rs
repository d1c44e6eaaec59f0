//! Types de données pour le système audio
//!
//! Ce module définit les structures principales pour manipuler l'audio :
//! - AudioFrame : Frame audio brute capturée au microphone
//! - EncodedFrame : Frame PCM 16 bits encodée en base64, prête à partir sur le réseau
//! - OutputBuffer : Audio décodé prêt à être programmé sur le contexte de lecture
//! - PlaybackId : Identifiant d'un buffer programmé

use std::fmt;
use serde::{Deserialize, Serialize};

/// Type pour un échantillon audio
///
/// - Valeurs entre -1.0 et +1.0
/// - 0.0 = silence
pub type Sample = f32;

/// Frame d'audio brute (non compressée)
///
/// Une frame contient un bloc fixe d'échantillons mono produit par le
/// processeur de capture (4096 échantillons à 16 kHz par défaut).
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    /// Les échantillons audio bruts, mono
    pub samples: Vec<Sample>,

    /// Numéro de séquence dans l'ordre de capture
    pub sequence_number: u64,
}

impl AudioFrame {
    /// Crée une nouvelle frame audio
    ///
    /// # Example
    /// ```rust
    /// use audio::AudioFrame;
    ///
    /// let samples = vec![0.1, 0.2, -0.1, 0.0]; // 4 échantillons
    /// let frame = AudioFrame::new(samples, 42);
    /// assert_eq!(frame.sequence_number, 42);
    /// ```
    pub fn new(samples: Vec<Sample>, sequence_number: u64) -> Self {
        Self {
            samples,
            sequence_number,
        }
    }
}

/// Frame PCM 16 bits little-endian encodée en base64
///
/// C'est exactement le blob attendu par l'endpoint pour une entrée temps réel :
/// `{ "mimeType": "audio/pcm;rate=16000", "data": "<base64>" }`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedFrame {
    /// Type MIME portant la fréquence d'échantillonnage
    pub mime_type: String,

    /// Octets PCM encodés en base64
    pub data: String,
}

impl EncodedFrame {
    /// Crée une nouvelle frame encodée
    pub fn new(data: String, mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Buffer audio décodé, prêt à être joué
///
/// Mono, à la fréquence du contexte de sortie.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputBuffer {
    /// Échantillons normalisés dans [-1.0, 1.0)
    pub samples: Vec<Sample>,

    /// Fréquence d'échantillonnage des échantillons
    pub sample_rate: u32,
}

impl OutputBuffer {
    /// Crée un buffer de sortie
    pub fn new(samples: Vec<Sample>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Durée du buffer en secondes (l'unité de l'horloge de sortie)
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Vérifie si le buffer ne contient aucun échantillon
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Identifiant d'un buffer programmé sur un contexte de sortie
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_creation() {
        let samples = vec![0.1, -0.2, 0.3, 0.0];
        let frame = AudioFrame::new(samples.clone(), 42);

        assert_eq!(frame.samples, samples);
        assert_eq!(frame.sequence_number, 42);
    }

    #[test]
    fn test_output_buffer_duration() {
        let buffer = OutputBuffer::new(vec![0.0; 24_000], 24_000);
        assert!((buffer.duration_secs() - 1.0).abs() < f64::EPSILON);

        let empty = OutputBuffer::new(Vec::new(), 24_000);
        assert!(empty.is_empty());
        assert_eq!(empty.duration_secs(), 0.0);
    }

    #[test]
    fn test_encoded_frame_wire_format() {
        let frame = EncodedFrame::new("AAA=".to_string(), "audio/pcm;rate=16000");
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"mimeType":"audio/pcm;rate=16000","data":"AAA="}"#);
    }
}
