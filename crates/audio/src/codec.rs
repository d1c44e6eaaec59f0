//! Module d'encodage/décodage PCM 16 bits pour la session Live
//!
//! L'endpoint conversationnel attend du PCM 16 bits little-endian brut,
//! encodé en base64 dans du JSON. Ce module fait le pont
//! entre nos échantillons f32 et ce format, dans les deux sens.
//!
//! - Entrée : f32 [-1.0, 1.0] × 32768 → i16 → octets LE → base64
//! - Sortie : base64 → octets LE → i16 → f32 / 32768

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{
    AudioCodec, AudioConfig, AudioFrame, AudioResult, EncodedFrame, OutputBuffer, OverflowPolicy, Sample,
};

/// Facteur d'échelle entre f32 normalisé et i16
const PCM_SCALE: f32 = 32768.0;

/// Codec PCM 16 bits + base64
///
/// Sans état : chaque frame est encodée indépendamment.
#[derive(Clone, Debug)]
pub struct PcmCodec {
    /// Type MIME annoncé pour les frames encodées
    input_mime_type: String,

    /// Fréquence des buffers décodés
    output_sample_rate: u32,

    /// Traitement des échantillons hors plage
    overflow: OverflowPolicy,
}

impl PcmCodec {
    /// Crée un codec à partir de la configuration audio
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            input_mime_type: config.input_mime_type(),
            output_sample_rate: config.output_sample_rate,
            overflow: config.overflow,
        }
    }

    /// Convertit un échantillon f32 en i16 selon la politique de débordement
    pub fn sample_to_i16(sample: Sample, overflow: OverflowPolicy) -> i16 {
        let scaled = sample * PCM_SCALE;
        match overflow {
            OverflowPolicy::Saturate => scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16,
            // Troncature vers zéro puis repliement sur 16 bits
            OverflowPolicy::Wrap => scaled as i64 as i16,
        }
    }

    /// Convertit un échantillon i16 en f32 normalisé
    pub fn sample_from_i16(sample: i16) -> Sample {
        sample as f32 / PCM_SCALE
    }

    /// Encode des échantillons en octets PCM 16 bits little-endian
    pub fn samples_to_bytes(samples: &[Sample], overflow: OverflowPolicy) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            bytes.extend_from_slice(&Self::sample_to_i16(sample, overflow).to_le_bytes());
        }
        bytes
    }

    /// Décode des octets PCM 16 bits little-endian
    ///
    /// Un octet final isolé est ignoré.
    pub fn bytes_to_samples(bytes: &[u8]) -> Vec<Sample> {
        bytes
            .chunks_exact(2)
            .map(|pair| Self::sample_from_i16(i16::from_le_bytes([pair[0], pair[1]])))
            .collect()
    }
}

impl AudioCodec for PcmCodec {
    fn encode(&self, frame: &AudioFrame) -> EncodedFrame {
        let bytes = Self::samples_to_bytes(&frame.samples, self.overflow);
        EncodedFrame::new(STANDARD.encode(bytes), self.input_mime_type.clone())
    }

    fn decode(&self, payload: &str) -> AudioResult<OutputBuffer> {
        let bytes = STANDARD.decode(payload.trim())?;
        Ok(OutputBuffer::new(Self::bytes_to_samples(&bytes), self.output_sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> PcmCodec {
        PcmCodec::new(&AudioConfig::default())
    }

    #[test]
    fn test_encode_silence() {
        let frame = AudioFrame::new(vec![0.0; 4], 0);
        let encoded = codec().encode(&frame);

        assert_eq!(encoded.mime_type, "audio/pcm;rate=16000");
        assert_eq!(encoded.data, "AAAAAAAAAAA="); // 8 octets nuls
    }

    #[test]
    fn test_little_endian_layout() {
        // 0.5 * 32768 = 16384 = 0x4000 → [0x00, 0x40]
        let bytes = PcmCodec::samples_to_bytes(&[0.5, -0.5], OverflowPolicy::Saturate);
        assert_eq!(bytes, vec![0x00, 0x40, 0x00, 0xC0]);
    }

    #[test]
    fn test_round_trip_within_quantization() {
        let codec = codec();
        let samples: Vec<f32> = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin() * 0.8)
            .collect();
        let frame = AudioFrame::new(samples.clone(), 1);

        let encoded = codec.encode(&frame);
        let decoded = codec.decode(&encoded.data).expect("Décodage");

        assert_eq!(decoded.samples.len(), samples.len());
        assert_eq!(decoded.sample_rate, 24_000);
        for (original, restored) in samples.iter().zip(decoded.samples.iter()) {
            assert!((original - restored).abs() <= 1.0 / 32768.0, "{} vs {}", original, restored);
        }
    }

    #[test]
    fn test_saturate_policy_clamps() {
        assert_eq!(PcmCodec::sample_to_i16(1.0, OverflowPolicy::Saturate), i16::MAX);
        assert_eq!(PcmCodec::sample_to_i16(1.7, OverflowPolicy::Saturate), i16::MAX);
        assert_eq!(PcmCodec::sample_to_i16(-1.0, OverflowPolicy::Saturate), i16::MIN);
        assert_eq!(PcmCodec::sample_to_i16(-3.0, OverflowPolicy::Saturate), i16::MIN);
    }

    #[test]
    fn test_wrap_policy_wraps() {
        // 1.0 * 32768 = 32768 → -32768 après repliement
        assert_eq!(PcmCodec::sample_to_i16(1.0, OverflowPolicy::Wrap), i16::MIN);
        // Dans la plage, les deux politiques sont identiques
        assert_eq!(PcmCodec::sample_to_i16(0.25, OverflowPolicy::Wrap), 8192);
        assert_eq!(PcmCodec::sample_to_i16(-0.25, OverflowPolicy::Wrap), -8192);
    }

    #[test]
    fn test_decode_invalid_base64() {
        let result = codec().decode("pas du base64 !");
        assert!(matches!(result, Err(crate::AudioError::InvalidPayload(_))));
    }

    #[test]
    fn test_decode_ignores_trailing_odd_byte() {
        let payload = STANDARD.encode([0x00, 0x40, 0x7F]);
        let decoded = codec().decode(&payload).expect("Décodage");
        assert_eq!(decoded.samples, vec![0.5]);
    }
}
