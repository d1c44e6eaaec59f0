//! Module de lecture audio utilisant cpal
//!
//! Ce module implémente `OutputBackend` et `OutputContext` avec cpal.
//!
//! Contrairement à une simple file de frames, la lecture est pilotée par une
//! horloge : chaque buffer est programmé à un instant précis, et le callback
//! cpal mixe à chaque période les buffers dont la fenêtre recouvre les
//! échantillons à rendre. L'horloge avance du nombre d'échantillons réellement
//! envoyés au matériel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfig};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};

use crate::capture::device_label;
use crate::{AudioError, AudioResult, OutputBackend, OutputBuffer, OutputContext, PlaybackId, Sample};

/// Fabrique de contextes de lecture sur la sortie par défaut du système
#[derive(Clone, Debug, Default)]
pub struct CpalOutputBackend;

impl CpalOutputBackend {
    /// Crée le backend de lecture
    pub fn new() -> Self {
        Self
    }
}

impl OutputBackend for CpalOutputBackend {
    fn create_output_context(&self, sample_rate: u32) -> AudioResult<Box<dyn OutputContext>> {
        Ok(Box::new(CpalOutputContext::new(sample_rate)?))
    }
}

/// Buffer programmé sur la timeline
struct ScheduledSource {
    id: PlaybackId,

    /// Première frame périphérique où le buffer est audible
    start_frame: u64,

    /// Frame périphérique (exclue) où le buffer se termine
    end_frame: u64,

    samples: Vec<Sample>,
    sample_rate: u32,
}

impl ScheduledSource {
    /// Place un buffer démarrant à `start_at` secondes
    ///
    /// Début et fin sont arrondis de la même façon : un buffer programmé à la
    /// fin exacte du précédent commence sur la frame où celui-ci s'arrête.
    fn new(id: PlaybackId, start_at: f64, buffer: OutputBuffer, device_rate: u32) -> Self {
        let sample_rate = buffer.sample_rate.max(1);
        let end_at = start_at + buffer.samples.len() as f64 / sample_rate as f64;
        Self {
            id,
            start_frame: frame_at(start_at, device_rate),
            end_frame: frame_at(end_at, device_rate),
            samples: buffer.samples,
            sample_rate,
        }
    }

    /// Valeur du buffer à une frame périphérique donnée (interpolation linéaire)
    fn sample_at(&self, frame: u64, device_rate: u32) -> Sample {
        if frame < self.start_frame || frame >= self.end_frame {
            return 0.0;
        }

        let position = (frame - self.start_frame) as f64 * self.sample_rate as f64 / device_rate as f64;
        let index = position as usize;
        let fraction = (position - index as f64) as f32;

        match (self.samples.get(index), self.samples.get(index + 1)) {
            (Some(&current), Some(&next)) => current + (next - current) * fraction,
            (Some(&current), None) => current,
            _ => 0.0,
        }
    }
}

/// Ensemble des buffers programmés, partagé avec le callback cpal
#[derive(Default)]
struct Timeline {
    sources: Vec<ScheduledSource>,
}

impl Timeline {
    /// Mixe les buffers actifs sur `frames` frames à partir de `base_frame`
    ///
    /// `write` reçoit (index de frame, valeur mixée).
    fn render<F: FnMut(usize, Sample)>(&mut self, base_frame: u64, frames: usize, device_rate: u32, mut write: F) {
        for offset in 0..frames {
            let frame = base_frame + offset as u64;
            let mixed: Sample = self.sources.iter().map(|source| source.sample_at(frame, device_rate)).sum();
            write(offset, mixed.clamp(-1.0, 1.0));
        }

        // Les buffers entièrement joués quittent la timeline
        let horizon = base_frame + frames as u64;
        self.sources.retain(|source| source.end_frame > horizon);
    }
}

/// Frame périphérique correspondant à un instant de l'horloge de sortie
fn frame_at(time: f64, device_rate: u32) -> u64 {
    (time.max(0.0) * device_rate as f64).round() as u64
}

/// Contexte de lecture cpal avec horloge audio
pub struct CpalOutputContext {
    /// Fréquence demandée (celle des buffers décodés)
    sample_rate: u32,

    /// Fréquence réelle du périphérique, base de l'horloge
    device_rate: u32,

    /// Stream audio actif (None une fois fermé)
    stream: Option<Stream>,

    /// Frames rendues depuis l'ouverture : c'est l'horloge de sortie
    frames_rendered: Arc<AtomicU64>,

    /// Buffers programmés, lus par le callback
    timeline: Arc<Mutex<Timeline>>,

    next_id: u64,
    closed: bool,
}

impl CpalOutputContext {
    /// Ouvre la sortie par défaut et démarre l'horloge
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun haut-parleur n'est disponible
    /// - `AudioError::ConfigError` si aucune configuration n'est utilisable
    pub fn new(sample_rate: u32) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDeviceFound)?;
        let supported = Self::choose_config(&device, sample_rate)?;
        let config = supported.config();

        info!(
            device = %device_label(&device),
            device_rate = config.sample_rate,
            requested_rate = sample_rate,
            channels = config.channels,
            "🔊 Contexte de lecture ouvert"
        );

        let frames_rendered = Arc::new(AtomicU64::new(0));
        let timeline = Arc::new(Mutex::new(Timeline::default()));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, &frames_rendered, &timeline)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, &frames_rendered, &timeline)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, &frames_rendered, &timeline)?,
            other => {
                return Err(AudioError::ConfigError(format!("Format d'échantillon non supporté : {:?}", other)));
            }
        };
        stream.play()?;

        Ok(Self {
            sample_rate,
            device_rate: config.sample_rate,
            stream: Some(stream),
            frames_rendered,
            timeline,
            next_id: 0,
            closed: false,
        })
    }

    /// Utilise la fréquence demandée si possible, sinon la configuration par défaut
    fn choose_config(device: &Device, sample_rate: u32) -> AudioResult<SupportedStreamConfig> {
        if let Ok(ranges) = device.supported_output_configs() {
            for range in ranges {
                let format_ok = matches!(
                    range.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                );
                if format_ok && range.min_sample_rate() <= sample_rate && sample_rate <= range.max_sample_rate() {
                    return Ok(range.with_sample_rate(sample_rate));
                }
            }
        }

        Ok(device.default_output_config()?)
    }

    /// Construit le stream de sortie pour un format d'échantillon donné
    ///
    /// Le callback ne bloque jamais : si la timeline est verrouillée,
    /// la période est remplie de silence mais l'horloge avance quand même.
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        frames_rendered: &Arc<AtomicU64>,
        timeline: &Arc<Mutex<Timeline>>,
    ) -> AudioResult<Stream>
    where
        T: SizedSample + cpal::FromSample<f32>,
    {
        let channels = config.channels.max(1) as usize;
        let device_rate = config.sample_rate;
        let frames_rendered = Arc::clone(frames_rendered);
        let timeline = Arc::clone(timeline);

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                use cpal::Sample as _;
                let frames = data.len() / channels;
                let base_frame = frames_rendered.load(Ordering::Acquire);

                match timeline.try_lock() {
                    Ok(mut timeline) => {
                        timeline.render(base_frame, frames, device_rate, |offset, value| {
                            let converted = T::from_sample(value);
                            for slot in &mut data[offset * channels..(offset + 1) * channels] {
                                *slot = converted;
                            }
                        });
                    }
                    Err(_) => {
                        for slot in data.iter_mut() {
                            *slot = T::EQUILIBRIUM;
                        }
                    }
                }

                frames_rendered.fetch_add(frames as u64, Ordering::Release);
            },
            move |err| {
                warn!("❌ Erreur stream audio sortie : {}", err);
            },
            None,
        )?;

        Ok(stream)
    }
}

impl OutputContext for CpalOutputContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, buffer: OutputBuffer, start_at: f64) -> AudioResult<PlaybackId> {
        if self.closed {
            return Err(AudioError::ContextClosed);
        }

        let id = PlaybackId(self.next_id);
        self.next_id += 1;

        let source = ScheduledSource::new(id, start_at, buffer, self.device_rate);

        let mut timeline = self
            .timeline
            .lock()
            .map_err(|_| AudioError::InitializationError("Timeline de lecture empoisonnée".to_string()))?;
        timeline.sources.push(source);

        Ok(id)
    }

    fn stop(&mut self, id: PlaybackId) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.sources.retain(|source| source.id != id);
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.sources.clear();
        }

        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Pause du stream de sortie impossible : {}", e);
            }
        }

        self.closed = true;
        debug!("🛑 Contexte de lecture fermé");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for CpalOutputContext {
    fn drop(&mut self) {
        self.close();
    }
}
