//! Doubles de test pour les backends audio
//!
//! Permet de faire tourner une session complète sans matériel :
//! - `MockCaptureBackend` : micro factice, erreurs d'accès simulées, injection de frames
//! - `MockOutputBackend` : horloge avancée à la main, trace des buffers programmés/arrêtés
//!
//! Chaque backend tient un registre des ressources acquises et libérées,
//! ce qui permet de vérifier qu'un arrêt libère tout, exactement une fois.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;

use crate::{
    AudioError, AudioFrame, AudioResult, CaptureBackend, FrameSink, InputContext, MicrophoneStream,
    OutputBackend, OutputBuffer, OutputContext, PlaybackId,
};

/// Compteur d'acquisitions/libérations pour un type de ressource
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCount {
    pub acquired: u32,
    pub released: u32,
}

impl ResourceCount {
    /// Toutes les ressources acquises ont été libérées exactement une fois
    pub fn is_balanced(&self) -> bool {
        self.acquired == self.released
    }
}

/// Erreur d'accès au micro à simuler
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockFailure {
    NoDevice,
    PermissionDenied,
    DeviceBusy,
}

impl MockFailure {
    fn to_error(self) -> AudioError {
        match self {
            MockFailure::NoDevice => AudioError::NoDeviceFound,
            MockFailure::PermissionDenied => AudioError::PermissionDenied,
            MockFailure::DeviceBusy => AudioError::DeviceBusy("utilisé par un autre processus".to_string()),
        }
    }
}

#[derive(Default)]
struct CaptureState {
    unavailable: bool,
    failure: Option<MockFailure>,
    fail_attach: bool,
    sink: Option<FrameSink>,
    sequence: u64,
    dropped: u64,
    microphones: ResourceCount,
    input_contexts: ResourceCount,
}

/// Backend de capture factice
#[derive(Clone, Default)]
pub struct MockCaptureBackend {
    state: Arc<Mutex<CaptureState>>,
}

impl MockCaptureBackend {
    /// Micro présent, accès autorisé
    pub fn new() -> Self {
        Self::default()
    }

    /// Environnement sans aucune capacité de capture
    pub fn unavailable() -> Self {
        let backend = Self::default();
        backend.lock().unavailable = true;
        backend
    }

    /// L'ouverture du micro échoue avec l'erreur donnée
    pub fn failing_with(failure: MockFailure) -> Self {
        let backend = Self::default();
        backend.lock().failure = Some(failure);
        backend
    }

    /// L'attache du micro au contexte de capture échoue
    pub fn failing_attach() -> Self {
        let backend = Self::default();
        backend.lock().fail_attach = true;
        backend
    }

    /// Injecte une frame comme si le processeur de capture venait de la produire
    ///
    /// Retourne false si aucun contexte n'est attaché ou si la file est pleine
    /// (la frame est alors comptée comme perdue).
    pub fn feed(&self, samples: Vec<f32>) -> bool {
        let mut state = self.lock();
        let sequence = state.sequence;
        state.sequence += 1;
        let result = match &state.sink {
            Some(sink) => sink.try_send(AudioFrame::new(samples, sequence)),
            None => return false,
        };
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                state.dropped += 1;
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Vérifie si un contexte de capture est attaché et ouvert
    pub fn is_capturing(&self) -> bool {
        self.lock().sink.is_some()
    }

    /// Registre des microphones
    pub fn microphones(&self) -> ResourceCount {
        self.lock().microphones
    }

    /// Registre des contextes de capture
    pub fn input_contexts(&self) -> ResourceCount {
        self.lock().input_contexts
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CaptureBackend for MockCaptureBackend {
    fn is_available(&self) -> bool {
        !self.lock().unavailable
    }

    async fn open_microphone(&self) -> AudioResult<Box<dyn MicrophoneStream>> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(AudioError::CapabilityUnavailable);
        }
        if let Some(failure) = state.failure {
            return Err(failure.to_error());
        }

        state.microphones.acquired += 1;
        Ok(Box::new(MockMicrophone {
            backend: self.clone(),
            closed: false,
        }))
    }

    fn create_input_context(&self, sample_rate: u32) -> AudioResult<Box<dyn InputContext>> {
        self.lock().input_contexts.acquired += 1;
        Ok(Box::new(MockInputContext {
            backend: self.clone(),
            sample_rate,
            closed: false,
        }))
    }
}

/// Micro factice
pub struct MockMicrophone {
    backend: MockCaptureBackend,
    closed: bool,
}

impl MicrophoneStream for MockMicrophone {
    fn label(&self) -> String {
        "Micro de test".to_string()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.backend.lock().microphones.released += 1;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Contexte de capture factice : les frames viennent de `MockCaptureBackend::feed`
pub struct MockInputContext {
    backend: MockCaptureBackend,
    sample_rate: u32,
    closed: bool,
}

impl InputContext for MockInputContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn attach(&mut self, microphone: &dyn MicrophoneStream, _frame_size: usize, sink: FrameSink) -> AudioResult<()> {
        if self.closed {
            return Err(AudioError::ContextClosed);
        }
        if microphone.is_closed() {
            return Err(AudioError::DeviceDisconnected);
        }

        let mut state = self.backend.lock();
        if state.fail_attach {
            return Err(AudioError::DeviceBusy("flux interrompu".to_string()));
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn dropped_frames(&self) -> u64 {
        self.backend.lock().dropped
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.backend.lock();
            state.sink = None;
            state.input_contexts.released += 1;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Trace d'un buffer programmé sur un contexte factice
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledRecord {
    pub id: PlaybackId,
    pub start_at: f64,
    pub duration: f64,
    pub sample_count: usize,
}

#[derive(Default)]
struct OutputState {
    clock: f64,
    fail_create: bool,
    next_id: u64,
    scheduled: Vec<ScheduledRecord>,
    stopped: Vec<PlaybackId>,
    contexts: ResourceCount,
}

/// Backend de lecture factice avec horloge manuelle
#[derive(Clone, Default)]
pub struct MockOutputBackend {
    state: Arc<Mutex<OutputState>>,
}

impl MockOutputBackend {
    /// Horloge à 0, création de contexte autorisée
    pub fn new() -> Self {
        Self::default()
    }

    /// La création du contexte de lecture échoue
    pub fn failing() -> Self {
        let backend = Self::default();
        backend.lock().fail_create = true;
        backend
    }

    /// Place l'horloge de sortie à `time` secondes
    pub fn set_time(&self, time: f64) {
        self.lock().clock = time;
    }

    /// Avance l'horloge de sortie
    pub fn advance(&self, seconds: f64) {
        self.lock().clock += seconds;
    }

    /// Tous les buffers programmés, dans l'ordre de programmation
    pub fn scheduled(&self) -> Vec<ScheduledRecord> {
        self.lock().scheduled.clone()
    }

    /// Buffers arrêtés de force
    pub fn stopped(&self) -> Vec<PlaybackId> {
        self.lock().stopped.clone()
    }

    /// Registre des contextes de lecture
    pub fn contexts(&self) -> ResourceCount {
        self.lock().contexts
    }

    fn lock(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OutputBackend for MockOutputBackend {
    fn create_output_context(&self, sample_rate: u32) -> AudioResult<Box<dyn OutputContext>> {
        let mut state = self.lock();
        if state.fail_create {
            return Err(AudioError::InitializationError("sortie audio indisponible".to_string()));
        }

        state.contexts.acquired += 1;
        Ok(Box::new(MockOutputContext {
            backend: self.clone(),
            sample_rate,
            closed: false,
        }))
    }
}

/// Contexte de lecture factice
pub struct MockOutputContext {
    backend: MockOutputBackend,
    sample_rate: u32,
    closed: bool,
}

impl OutputContext for MockOutputContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.backend.lock().clock
    }

    fn schedule(&mut self, buffer: OutputBuffer, start_at: f64) -> AudioResult<PlaybackId> {
        if self.closed {
            return Err(AudioError::ContextClosed);
        }

        let mut state = self.backend.lock();
        let id = PlaybackId(state.next_id);
        state.next_id += 1;
        state.scheduled.push(ScheduledRecord {
            id,
            start_at,
            duration: buffer.duration_secs(),
            sample_count: buffer.samples.len(),
        });
        Ok(id)
    }

    fn stop(&mut self, id: PlaybackId) {
        self.backend.lock().stopped.push(id);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.backend.lock().contexts.released += 1;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
