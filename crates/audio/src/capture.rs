//! Module de capture audio utilisant cpal
//!
//! Ce module implémente `CaptureBackend`, `MicrophoneStream` et `InputContext`
//! avec la librairie cpal (Cross-Platform Audio Library).
//!
//! cpal supporte Windows (WASAPI), macOS (CoreAudio), et Linux (ALSA/PulseAudio).
//!
//! # Architecture thread
//!
//! cpal fonctionne avec des callbacks. Quand des données audio arrivent,
//! cpal appelle notre fonction qui convertit en f32, mixe en mono, rééchantillonne
//! vers la fréquence du contexte et accumule jusqu'à obtenir une frame complète.
//! La frame part alors via un channel tokio vers la tâche de session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfig};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::{
    AudioError, AudioFrame, AudioResult, CaptureBackend, FrameSink, InputContext, MicrophoneStream,
};

/// Accès aux microphones via l'host audio par défaut du système
#[derive(Clone, Debug, Default)]
pub struct CpalCaptureBackend;

impl CpalCaptureBackend {
    /// Crée le backend de capture
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureBackend for CpalCaptureBackend {
    fn is_available(&self) -> bool {
        cpal::default_host().input_devices().is_ok()
    }

    async fn open_microphone(&self) -> AudioResult<Box<dyn MicrophoneStream>> {
        let host = cpal::default_host();

        let mut devices = host.input_devices().map_err(|e| {
            warn!("Énumération des entrées impossible : {}", e);
            AudioError::CapabilityUnavailable
        })?;

        // Le périphérique par défaut, sinon le premier disponible
        let device = match host.default_input_device() {
            Some(device) => device,
            None => devices.next().ok_or(AudioError::NoDeviceFound)?,
        };

        // Sonde la configuration : c'est ici que les backends signalent
        // un refus d'accès ou un périphérique déjà occupé
        let default_config = device.default_input_config()?;
        let label = device_label(&device);

        info!(
            device = %label,
            sample_rate = default_config.sample_rate(),
            channels = default_config.channels(),
            "🎤 Microphone ouvert"
        );

        Ok(Box::new(CpalMicrophone {
            device,
            label,
            closed: false,
        }))
    }

    fn create_input_context(&self, sample_rate: u32) -> AudioResult<Box<dyn InputContext>> {
        Ok(Box::new(CpalInputContext::new(sample_rate)))
    }
}

/// Microphone acquis via cpal
pub struct CpalMicrophone {
    /// Périphérique audio d'entrée
    device: Device,

    /// Nom du périphérique pour debug
    label: String,

    closed: bool,
}

impl MicrophoneStream for CpalMicrophone {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn close(&mut self) {
        if !self.closed {
            debug!(device = %self.label, "Microphone libéré");
            self.closed = true;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Contexte de capture cpal
///
/// Produit des frames mono de taille fixe à `sample_rate`, quelle que soit
/// la configuration native du micro.
pub struct CpalInputContext {
    /// Fréquence des frames produites
    sample_rate: u32,

    /// Stream audio actif (None si pas encore attaché ou fermé)
    stream: Option<Stream>,

    /// Frames perdues faute de place dans la file, incrémenté par le callback
    dropped: Arc<AtomicU64>,

    closed: bool,
}

impl CpalInputContext {
    /// Crée un contexte de capture (aucun stream n'est ouvert avant `attach`)
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            stream: None,
            dropped: Arc::new(AtomicU64::new(0)),
            closed: false,
        }
    }

    /// Choisit la configuration du stream
    ///
    /// Utilise directement la fréquence cible si le périphérique la supporte,
    /// sinon la configuration par défaut (le rééchantillonnage se fait alors chez nous).
    fn choose_config(&self, device: &Device) -> AudioResult<SupportedStreamConfig> {
        if let Ok(ranges) = device.supported_input_configs() {
            for range in ranges {
                let format_ok = matches!(
                    range.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                );
                if format_ok
                    && range.min_sample_rate() <= self.sample_rate
                    && self.sample_rate <= range.max_sample_rate()
                {
                    return Ok(range.with_sample_rate(self.sample_rate));
                }
            }
        }

        Ok(device.default_input_config()?)
    }

    /// Construit le stream pour un format d'échantillon donné
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mut assembler: FrameAssembler,
        sink: FrameSink,
        dropped: Arc<AtomicU64>,
    ) -> AudioResult<Stream>
    where
        T: SizedSample,
        f32: cpal::FromSample<T>,
    {
        let stream = device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                use cpal::Sample;
                assembler.push_interleaved(data.iter().map(|s| s.to_sample::<f32>()), |frame| {
                    deliver(&sink, frame, &dropped);
                });
            },
            move |err| {
                warn!("❌ Erreur stream audio : {}", err);
            },
            None,
        )?;

        Ok(stream)
    }
}

impl InputContext for CpalInputContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn attach(&mut self, microphone: &dyn MicrophoneStream, frame_size: usize, sink: FrameSink) -> AudioResult<()> {
        if self.closed {
            return Err(AudioError::ContextClosed);
        }

        let microphone = microphone
            .as_any()
            .downcast_ref::<CpalMicrophone>()
            .ok_or_else(|| AudioError::ConfigError("Microphone non issu de cpal".to_string()))?;

        if microphone.is_closed() {
            return Err(AudioError::DeviceDisconnected);
        }

        let supported = self.choose_config(&microphone.device)?;
        let config = supported.config();
        let assembler = FrameAssembler::new(
            config.channels as usize,
            config.sample_rate,
            self.sample_rate,
            frame_size,
        );

        info!(
            device_rate = config.sample_rate,
            target_rate = self.sample_rate,
            channels = config.channels,
            frame_size,
            "🎵 Démarrage capture"
        );

        let device = &microphone.device;
        let dropped = Arc::clone(&self.dropped);
        let stream = match supported.sample_format() {
            SampleFormat::F32 => Self::build_stream::<f32>(device, &config, assembler, sink, dropped)?,
            SampleFormat::I16 => Self::build_stream::<i16>(device, &config, assembler, sink, dropped)?,
            SampleFormat::U16 => Self::build_stream::<u16>(device, &config, assembler, sink, dropped)?,
            other => {
                return Err(AudioError::ConfigError(format!("Format d'échantillon non supporté : {:?}", other)));
            }
        };
        stream.play()?;

        self.stream = Some(stream);
        Ok(())
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Pause du stream de capture impossible : {}", e);
            }
        }

        self.closed = true;
        debug!("🛑 Contexte de capture fermé");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for CpalInputContext {
    fn drop(&mut self) {
        self.close();
    }
}

/// Transmet une frame sans bloquer le thread audio
///
/// File pleine : la frame est perdue et comptée.
fn deliver(sink: &FrameSink, frame: AudioFrame, dropped: &AtomicU64) {
    match sink.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(frame)) => {
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Frame #{} perdue, file de capture pleine ({} au total)", frame.sequence_number, total);
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

/// Découpe un flux d'échantillons entrelacés en frames mono de taille fixe
///
/// Étapes, pour chaque groupe de `channels` échantillons :
/// 1. moyenne des canaux (mono)
/// 2. rééchantillonnage linéaire de `source_rate` vers `target_rate`
/// 3. accumulation jusqu'à `frame_size` échantillons
pub struct FrameAssembler {
    channels: usize,

    /// Avance dans le flux source pour un échantillon produit
    step: f64,

    /// Position du prochain échantillon produit, relative à l'échantillon précédent
    position: f64,

    /// Dernier échantillon mono reçu
    previous: f32,

    frame_size: usize,
    buffer: Vec<f32>,
    pending_channels: Vec<f32>,
    sequence: u64,
}

impl FrameAssembler {
    /// Crée un assembleur
    pub fn new(channels: usize, source_rate: u32, target_rate: u32, frame_size: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            step: source_rate as f64 / target_rate.max(1) as f64,
            position: 1.0,
            previous: 0.0,
            frame_size,
            buffer: Vec::with_capacity(frame_size),
            pending_channels: Vec::with_capacity(channels),
            sequence: 0,
        }
    }

    /// Ajoute des échantillons entrelacés ; `emit` reçoit chaque frame complète
    pub fn push_interleaved<I, F>(&mut self, samples: I, mut emit: F)
    where
        I: IntoIterator<Item = f32>,
        F: FnMut(AudioFrame),
    {
        for sample in samples {
            self.pending_channels.push(sample);
            if self.pending_channels.len() < self.channels {
                continue;
            }

            let mono = self.pending_channels.iter().sum::<f32>() / self.channels as f32;
            self.pending_channels.clear();
            self.push_mono(mono, &mut emit);
        }
    }

    fn push_mono<F: FnMut(AudioFrame)>(&mut self, sample: f32, emit: &mut F) {
        // Même fréquence : pas d'interpolation
        if (self.step - 1.0).abs() < f64::EPSILON {
            self.push_output(sample, emit);
            return;
        }

        while self.position <= 1.0 {
            let value = self.previous + (sample - self.previous) * self.position as f32;
            self.push_output(value, emit);
            self.position += self.step;
        }
        self.position -= 1.0;
        self.previous = sample;
    }

    fn push_output<F: FnMut(AudioFrame)>(&mut self, sample: f32, emit: &mut F) {
        self.buffer.push(sample);
        if self.buffer.len() >= self.frame_size {
            let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.frame_size));
            emit(AudioFrame::new(samples, self.sequence));
            self.sequence += 1;
        }
    }
}

/// Nom lisible d'un périphérique cpal
pub(crate) fn device_label(device: &Device) -> String {
    device
        .description()
        .ok()
        .map(|desc| desc.name().to_string())
        .unwrap_or_else(|| "Périphérique inconnu".to_string())
}
