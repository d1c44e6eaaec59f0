//! Configuration audio pour la session vocale Live
//!
//! Ce module définit les paramètres audio imposés par l'endpoint conversationnel :
//! l'entrée est envoyée en PCM 16 bits à 16 kHz, la sortie revient en PCM 16 bits
//! à 24 kHz, le tout en mono.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fréquence d'échantillonnage attendue par l'endpoint pour l'audio envoyé
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Fréquence d'échantillonnage de l'audio synthétisé renvoyé par l'endpoint
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Nombre d'échantillons par frame capturée
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// Politique de conversion f32 → i16 pour les échantillons hors de [-1.0, 1.0]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Écrêtage à [-32768, 32767]
    #[default]
    Saturate,

    /// Repliement modulo 2^16, comme une affectation dans un Int16Array.
    /// Un échantillon à 1.0 devient -32768.
    Wrap,
}

/// Configuration principale pour tout le système audio
///
/// `#[derive(Serialize, Deserialize)]` : Permet de charger depuis le fichier de config
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Fréquence du contexte de capture (Hz)
    pub input_sample_rate: u32,

    /// Fréquence du contexte de lecture (Hz)
    pub output_sample_rate: u32,

    /// Nombre d'échantillons par frame envoyée
    ///
    /// 4096 échantillons à 16 kHz = 256ms par frame
    pub frame_size: usize,

    /// Nombre de canaux audio (la voix est toujours en mono)
    pub channels: u16,

    /// Conversion des échantillons hors plage lors de l'encodage
    pub overflow: OverflowPolicy,

    /// Profondeur du channel entre le callback de capture et la session
    pub frame_queue_capacity: usize,

    /// Frames gardées en attente tant que l'endpoint n'a pas confirmé la session
    pub outbound_queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            channels: 1,
            overflow: OverflowPolicy::default(),
            frame_queue_capacity: 16,
            outbound_queue_capacity: 32,
        }
    }
}

impl AudioConfig {
    /// Type MIME annoncé pour chaque frame envoyée
    ///
    /// Exemple : `audio/pcm;rate=16000`
    pub fn input_mime_type(&self) -> String {
        pcm_mime_type(self.input_sample_rate)
    }

    /// Durée couverte par une frame capturée
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / self.input_sample_rate as f64)
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if self.input_sample_rate < 8000 || self.input_sample_rate > 48000 {
            return Err(format!(
                "Sample rate d'entrée invalide: {} (doit être entre 8000 et 48000)",
                self.input_sample_rate
            ));
        }

        if self.output_sample_rate < 8000 || self.output_sample_rate > 48000 {
            return Err(format!(
                "Sample rate de sortie invalide: {} (doit être entre 8000 et 48000)",
                self.output_sample_rate
            ));
        }

        if self.channels != 1 {
            return Err(format!("Nombre de canaux invalide: {} (seul le mono est supporté)", self.channels));
        }

        if self.frame_size < 256 || self.frame_size > 16384 {
            return Err(format!(
                "Taille de frame invalide: {} (doit être entre 256 et 16384)",
                self.frame_size
            ));
        }

        if self.frame_queue_capacity == 0 {
            return Err("La file de capture doit contenir au moins une frame".to_string());
        }

        Ok(())
    }
}

/// Construit le type MIME PCM pour une fréquence donnée
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();

        assert_eq!(config.input_mime_type(), "audio/pcm;rate=16000");
        assert_eq!(config.frame_duration(), Duration::from_millis(256));
        assert_eq!(config.overflow, OverflowPolicy::Saturate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AudioConfig::default();

        config.input_sample_rate = 1000; // Trop bas
        assert!(config.validate().is_err());

        config.input_sample_rate = INPUT_SAMPLE_RATE;
        config.channels = 2; // Pas de stéréo
        assert!(config.validate().is_err());

        config.channels = 1;
        config.frame_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let config: AudioConfig = serde_json::from_str(r#"{"overflow":"wrap"}"#).unwrap();
        assert_eq!(config.overflow, OverflowPolicy::Wrap);
        assert_eq!(config.frame_size, DEFAULT_FRAME_SIZE);
    }
}
