//! Session audio Live
//!
//! Une session relie trois ressources exclusives : le microphone (avec son
//! contexte de capture), le contexte de lecture et la connexion à l'endpoint.
//! Elles sont toutes acquises par `start()` et toutes libérées, exactement
//! une fois, par `stop()` ou par une fin de session côté endpoint.
//!
//! Une seule tâche tokio traite, dans l'ordre d'arrivée, les frames
//! capturées et les événements de l'endpoint. Chaque traitement se fait
//! sous un verrou court qui n'est jamais gardé à travers un `.await`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use audio::{
    AudioCodec, AudioError, AudioFrame, AudioResult, CaptureBackend, FrameSink, InputContext,
    MicrophoneStream, OutputBackend, OutputContext, PcmCodec,
};
use network::{ConnectionManager, ConnectionState, LiveConnector, ServerEvent};

use crate::{Language, LiveConfig, LiveError, LiveResult, PlaybackScheduler};

/// Callback appelé quand la session se termine d'elle-même
pub type TerminateCallback = Box<dyn FnOnce(Termination) + Send + 'static>;

/// Cause d'une fin de session non demandée par l'appelant
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// L'endpoint a fermé la connexion
    RemoteClosed { code: Option<u16>, reason: String },

    /// Le transport a échoué en cours de session
    TransportError(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::RemoteClosed { code: Some(code), reason } => {
                write!(f, "Connexion fermée par l'endpoint ({}) {}", code, reason)
            }
            Termination::RemoteClosed { code: None, reason } => {
                write!(f, "Connexion fermée par l'endpoint {}", reason)
            }
            Termination::TransportError(message) => write!(f, "Erreur transport: {}", message),
        }
    }
}

/// Statistiques de la session courante (ou de la dernière)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionStats {
    /// Frames produites par la capture
    pub frames_captured: u64,

    /// Frames confiées au transport
    pub frames_sent: u64,

    /// Frames perdues avant l'ouverture (file pleine)
    pub frames_dropped: u64,

    /// Frames perdues à la capture, la session ne suivant pas
    pub capture_overruns: u64,

    /// Messages reçus de l'endpoint
    pub messages_received: u64,

    /// Chunks audio programmés en lecture
    pub chunks_scheduled: u64,

    /// Chunks audio illisibles ignorés
    pub payload_errors: u64,

    /// Buffers programmés pas encore terminés
    pub active_buffers: usize,

    /// Premier instant libre sur l'horloge de sortie (secondes)
    pub next_start_time: f64,
}

/// Session vocale temps réel
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use audio::{CpalCaptureBackend, CpalOutputBackend};
/// use live::{Language, LiveAudioSession};
/// use network::{ConnectionConfig, WebSocketConnector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = LiveAudioSession::new(
///     Language::English,
///     Arc::new(CpalCaptureBackend::new()),
///     Arc::new(CpalOutputBackend::new()),
///     Arc::new(WebSocketConnector::new(ConnectionConfig::with_api_key("..."))),
/// );
///
/// session.start(|reason| eprintln!("Session terminée: {}", reason)).await?;
/// // ...
/// session.stop();
/// # Ok(())
/// # }
/// ```
pub struct LiveAudioSession {
    language: Language,
    config: LiveConfig,
    capture: Arc<dyn CaptureBackend>,
    output: Arc<dyn OutputBackend>,
    connector: Arc<dyn LiveConnector>,

    /// État partagé avec la tâche de session (gardé après l'arrêt pour les stats)
    shared: Option<Arc<Mutex<SessionState>>>,

    task: Option<JoinHandle<()>>,
}

impl LiveAudioSession {
    pub fn new(
        language: Language,
        capture: Arc<dyn CaptureBackend>,
        output: Arc<dyn OutputBackend>,
        connector: Arc<dyn LiveConnector>,
    ) -> Self {
        Self {
            language,
            config: LiveConfig::default(),
            capture,
            output,
            connector,
            shared: None,
            task: None,
        }
    }

    /// Remplace la configuration par défaut
    pub fn with_config(mut self, config: LiveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Démarre une session
    ///
    /// Ouvre le micro, les deux contextes audio et la connexion, puis lance
    /// la tâche de session. `on_terminate` est appelé une seule fois si la
    /// session se termine côté endpoint ; jamais après `stop()`.
    ///
    /// # Erreurs
    /// - `LiveError::AlreadyActive` : Une session tourne déjà
    /// - `LiveError::CapabilityUnavailable` / `DeviceNotFound` / `PermissionDenied` / `DeviceBusy`
    /// - `LiveError::Transport` : Connexion impossible
    ///
    /// En cas d'échec, tout ce qui avait été acquis est libéré.
    pub async fn start<F>(&mut self, on_terminate: F) -> LiveResult<()>
    where
        F: FnOnce(Termination) + Send + 'static,
    {
        if self.is_active() {
            return Err(LiveError::AlreadyActive);
        }
        self.stop();

        self.config
            .validate()
            .map_err(|e| LiveError::Audio(AudioError::ConfigError(e)))?;

        if !self.capture.is_available() {
            return Err(LiveError::CapabilityUnavailable);
        }

        let audio = self.config.audio.clone();

        // Aucun contexte audio n'existe tant que le micro n'est pas obtenu
        let microphone = self.capture.open_microphone().await?;
        info!("Microphone ouvert: {}", microphone.label());
        let mut pending = PendingStart::new(microphone);

        match self.capture.create_input_context(audio.input_sample_rate) {
            Ok(context) => pending.input = Some(context),
            Err(e) => return Err(pending.fail(e)),
        }
        match self.output.create_output_context(audio.output_sample_rate) {
            Ok(context) => pending.output = Some(context),
            Err(e) => return Err(pending.fail(e)),
        }

        let setup = self.config.session_setup(self.language);
        let link = match self.connector.connect(&setup).await {
            Ok(link) => link,
            Err(e) => return Err(pending.fail(e)),
        };
        pending.connection = Some(ConnectionManager::new(link.connection, audio.outbound_queue_capacity));

        let (sink, frames) = mpsc::channel(audio.frame_queue_capacity.max(1));
        if let Err(e) = pending.attach(audio.frame_size, sink) {
            return Err(pending.fail(e));
        }

        let resources = match pending.into_resources() {
            Ok(resources) => resources,
            Err(pending) => return Err(pending.fail(AudioError::ContextClosed)),
        };

        let state = SessionState {
            resources: Some(resources),
            scheduler: PlaybackScheduler::new(),
            codec: PcmCodec::new(&audio),
            on_terminate: Some(Box::new(on_terminate)),
            stats: SessionStats::default(),
        };
        let shared = Arc::new(Mutex::new(state));

        self.task = Some(tokio::spawn(run_session(Arc::clone(&shared), frames, link.events)));
        self.shared = Some(shared);

        info!(language = %self.language, frame = ?audio.frame_duration(), "Session démarrée");
        Ok(())
    }

    /// Arrête la session et libère toutes les ressources
    ///
    /// Idempotent, ne panique pas, n'appelle jamais `on_terminate`.
    /// Les buffers en cours de lecture sont coupés immédiatement.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        if let Some(shared) = &self.shared {
            let mut state = lock(shared);
            state.on_terminate = None;
            if state.release() {
                info!("Session arrêtée");
            }
        }
    }

    /// Vérifie si une session détient ses ressources
    pub fn is_active(&self) -> bool {
        self.shared
            .as_ref()
            .map(|shared| lock(shared).resources.is_some())
            .unwrap_or(false)
    }

    /// État de la connexion (`Closed` hors session)
    pub fn connection_state(&self) -> ConnectionState {
        self.shared
            .as_ref()
            .and_then(|shared| {
                lock(shared)
                    .resources
                    .as_ref()
                    .map(|resources| resources.connection.state())
            })
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn stats(&self) -> SessionStats {
        self.shared
            .as_ref()
            .map(|shared| lock(shared).stats())
            .unwrap_or_default()
    }
}

impl Drop for LiveAudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ressources d'une session démarrée
struct SessionResources {
    microphone: Box<dyn MicrophoneStream>,
    input: Box<dyn InputContext>,
    output: Box<dyn OutputContext>,
    connection: ConnectionManager,
}

/// Ressources acquises pendant `start()`, libérées si une étape échoue
struct PendingStart {
    microphone: Box<dyn MicrophoneStream>,
    input: Option<Box<dyn InputContext>>,
    output: Option<Box<dyn OutputContext>>,
    connection: Option<ConnectionManager>,
}

impl PendingStart {
    fn new(microphone: Box<dyn MicrophoneStream>) -> Self {
        Self {
            microphone,
            input: None,
            output: None,
            connection: None,
        }
    }

    /// Libère tout ce qui a été acquis et retourne l'erreur
    fn fail(mut self, error: impl Into<LiveError>) -> LiveError {
        let error = error.into();
        warn!("Échec du démarrage: {}", error);

        if let Some(mut input) = self.input.take() {
            input.close();
        }
        self.microphone.close();
        if let Some(mut output) = self.output.take() {
            output.close();
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        error
    }

    /// Branche le micro sur le contexte de capture
    fn attach(&mut self, frame_size: usize, sink: FrameSink) -> AudioResult<()> {
        match self.input.as_mut() {
            Some(input) => input.attach(self.microphone.as_ref(), frame_size, sink),
            None => Err(AudioError::ContextClosed),
        }
    }

    fn into_resources(self) -> Result<SessionResources, Self> {
        match (self.input, self.output, self.connection) {
            (Some(input), Some(output), Some(connection)) => Ok(SessionResources {
                microphone: self.microphone,
                input,
                output,
                connection,
            }),
            (input, output, connection) => Err(Self {
                microphone: self.microphone,
                input,
                output,
                connection,
            }),
        }
    }
}

/// État muté par la tâche de session
struct SessionState {
    /// `None` une fois la session libérée
    resources: Option<SessionResources>,
    scheduler: PlaybackScheduler,
    codec: PcmCodec,
    on_terminate: Option<TerminateCallback>,
    stats: SessionStats,
}

impl SessionState {
    /// Encode une frame capturée et l'envoie (ou la met en attente)
    fn on_frame_captured(&mut self, frame: AudioFrame) {
        let Some(resources) = self.resources.as_mut() else {
            return;
        };

        self.stats.frames_captured += 1;
        let encoded = self.codec.encode(&frame);
        if let Err(e) = resources.connection.send_frame(encoded) {
            warn!("Frame #{} non envoyée: {}", frame.sequence_number, e);
        }
    }

    /// Traite un événement de l'endpoint
    ///
    /// Retourne la cause de fin si l'événement termine la session.
    fn on_server_event(&mut self, event: ServerEvent) -> Option<Termination> {
        let resources = self.resources.as_mut()?;

        if let Err(e) = resources.connection.on_server_event(&event) {
            warn!("Événement hors séquence: {}", e);
        }

        match event {
            ServerEvent::Message(message) => {
                self.stats.messages_received += 1;

                let Some(payload) = message.audio_payload() else {
                    return None;
                };

                match self.codec.decode(payload) {
                    Err(e) => {
                        self.stats.payload_errors += 1;
                        warn!("Chunk audio ignoré: {}", e);
                    }
                    Ok(buffer) if buffer.is_empty() => debug!("Chunk audio vide ignoré"),
                    Ok(buffer) => {
                        let now = resources.output.current_time();
                        self.scheduler.reap(now);

                        let start_at = self.scheduler.slot(now);
                        let duration = buffer.duration_secs();
                        match resources.output.schedule(buffer, start_at) {
                            Ok(id) => {
                                self.scheduler.commit(id, start_at, duration);
                                self.stats.chunks_scheduled += 1;
                                debug!("Buffer {} programmé à {:.3}s ({:.3}s)", id, start_at, duration);
                            }
                            Err(e) => warn!("Programmation impossible: {}", e),
                        }
                    }
                }
                None
            }
            ServerEvent::Closed(info) => Some(Termination::RemoteClosed {
                code: info.code,
                reason: info.reason,
            }),
            ServerEvent::Error(message) => Some(Termination::TransportError(message)),
        }
    }

    /// Libère les ressources ; retourne false si c'était déjà fait
    fn release(&mut self) -> bool {
        let Some(mut resources) = self.resources.take() else {
            return false;
        };

        resources.input.close();
        resources.microphone.close();

        // Seuls les buffers encore en cours de lecture sont coupés
        self.scheduler.reap(resources.output.current_time());
        for id in self.scheduler.drain() {
            resources.output.stop(id);
        }
        resources.output.close();

        resources.connection.close();
        absorb_resource_stats(&mut self.stats, &resources);
        true
    }

    /// Libère les ressources et récupère le callback à appeler
    fn terminate(&mut self) -> Option<TerminateCallback> {
        self.release();
        self.on_terminate.take()
    }

    fn stats(&mut self) -> SessionStats {
        if let Some(resources) = &self.resources {
            self.scheduler.reap(resources.output.current_time());
        }

        let mut stats = SessionStats {
            active_buffers: self.scheduler.active_count(),
            next_start_time: self.scheduler.next_start_time(),
            ..self.stats
        };
        if let Some(resources) = &self.resources {
            absorb_resource_stats(&mut stats, resources);
        }
        stats
    }
}

fn absorb_resource_stats(stats: &mut SessionStats, resources: &SessionResources) {
    let connection_stats = resources.connection.stats();
    stats.frames_sent = connection_stats.frames_sent;
    stats.frames_dropped = connection_stats.frames_dropped;
    stats.capture_overruns = resources.input.dropped_frames();
}

/// Boucle de la tâche de session
async fn run_session(
    shared: Arc<Mutex<SessionState>>,
    mut frames: mpsc::Receiver<AudioFrame>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
) {
    let termination = loop {
        tokio::select! {
            Some(frame) = frames.recv() => lock(&shared).on_frame_captured(frame),
            event = events.recv() => {
                let termination = match event {
                    Some(event) => lock(&shared).on_server_event(event),
                    None => Some(Termination::TransportError("flux d'événements interrompu".to_string())),
                };
                if let Some(termination) = termination {
                    break termination;
                }
            }
        }
    };

    info!("Fin de session: {}", termination);
    let callback = lock(&shared).terminate();
    if let Some(callback) = callback {
        callback(termination);
    }
}

fn lock(shared: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use audio::mock::{MockCaptureBackend, MockFailure, MockOutputBackend};
    use audio::AudioConfig;
    use network::{ServerMessage, SimulatedConnector, SimulatedPeer};

    use crate::ErrorKind;

    struct Harness {
        capture: MockCaptureBackend,
        output: MockOutputBackend,
        peer: SimulatedPeer,
        session: LiveAudioSession,
    }

    fn harness_with(capture: MockCaptureBackend, output: MockOutputBackend) -> Harness {
        let (connector, peer) = SimulatedConnector::new();
        let session = LiveAudioSession::new(
            Language::Persian,
            Arc::new(capture.clone()),
            Arc::new(output.clone()),
            Arc::new(connector),
        );
        Harness {
            capture,
            output,
            peer,
            session,
        }
    }

    fn harness() -> Harness {
        harness_with(MockCaptureBackend::new(), MockOutputBackend::new())
    }

    /// Enregistre les appels au callback de fin
    #[derive(Clone, Default)]
    struct Terminations(Arc<Mutex<Vec<Termination>>>);

    impl Terminations {
        fn callback(&self) -> impl FnOnce(Termination) + Send + 'static {
            let calls = Arc::clone(&self.0);
            move |termination| calls.lock().unwrap().push(termination)
        }

        fn calls(&self) -> Vec<Termination> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Chunk base64 de `seconds` secondes à 24 kHz
    fn chunk(seconds: f64) -> String {
        let samples = (seconds * 24_000.0).round() as usize;
        PcmCodec::new(&AudioConfig::default())
            .encode(&AudioFrame::new(vec![0.1; samples], 0))
            .data
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("Condition jamais remplie");
    }

    fn assert_all_released(h: &Harness) {
        assert!(h.capture.microphones().is_balanced());
        assert!(h.capture.input_contexts().is_balanced());
        assert!(h.output.contexts().is_balanced());
        assert!(!h.capture.is_capturing());
        assert!(!h.peer.is_connected());
    }

    #[tokio::test]
    async fn test_start_then_stop_releases_everything() {
        let mut h = harness();
        let terminations = Terminations::default();

        h.session.start(terminations.callback()).await.unwrap();
        assert!(h.session.is_active());
        assert_eq!(h.session.connection_state(), ConnectionState::Connecting);
        assert_eq!(h.capture.microphones().acquired, 1);
        assert_eq!(h.capture.input_contexts().acquired, 1);
        assert_eq!(h.output.contexts().acquired, 1);

        h.session.stop();

        assert!(!h.session.is_active());
        assert_eq!(h.session.connection_state(), ConnectionState::Closed);
        assert_all_released(&h);
        assert_eq!(h.peer.close_count(), 1);
        assert!(terminations.calls().is_empty());
    }

    #[tokio::test]
    async fn test_setup_carries_language_instruction() {
        let mut h = harness();
        h.session.start(|_| {}).await.unwrap();

        let setups = h.peer.setups();
        assert_eq!(setups.len(), 1);
        assert_eq!(setups[0].system_instruction, Language::Persian.system_instruction());
        assert_eq!(setups[0].voice_name, LiveConfig::default().voice_name);
    }

    #[tokio::test]
    async fn test_permission_denied_before_any_context() {
        let mut h = harness_with(
            MockCaptureBackend::failing_with(MockFailure::PermissionDenied),
            MockOutputBackend::new(),
        );

        let error = h.session.start(|_| {}).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::PermissionDenied);
        assert_eq!(h.capture.input_contexts().acquired, 0);
        assert_eq!(h.output.contexts().acquired, 0);
        assert_eq!(h.peer.connect_count(), 0);
        assert!(!h.session.is_active());
    }

    #[tokio::test]
    async fn test_device_errors_are_classified() {
        let cases = [
            (MockCaptureBackend::unavailable(), ErrorKind::CapabilityUnavailable),
            (MockCaptureBackend::failing_with(MockFailure::NoDevice), ErrorKind::DeviceAbsent),
            (MockCaptureBackend::failing_with(MockFailure::DeviceBusy), ErrorKind::DeviceBusy),
        ];

        for (capture, expected) in cases {
            let mut h = harness_with(capture, MockOutputBackend::new());
            let error = h.session.start(|_| {}).await.unwrap_err();
            assert_eq!(error.kind(), expected);
            assert_eq!(h.capture.microphones().acquired, 0);
        }
    }

    #[tokio::test]
    async fn test_output_failure_releases_capture() {
        let mut h = harness_with(MockCaptureBackend::new(), MockOutputBackend::failing());

        assert!(h.session.start(|_| {}).await.is_err());

        assert_eq!(h.capture.microphones().acquired, 1);
        assert_all_released(&h);
        assert_eq!(h.peer.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_releases_audio() {
        let mut h = harness();
        h.peer.fail_connect("refusée");

        let error = h.session.start(|_| {}).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Transport);
        assert_eq!(h.output.contexts().acquired, 1);
        assert_all_released(&h);
        assert!(!h.session.is_active());
    }

    #[tokio::test]
    async fn test_attach_failure_releases_connection() {
        let mut h = harness_with(MockCaptureBackend::failing_attach(), MockOutputBackend::new());

        let error = h.session.start(|_| {}).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::DeviceBusy);
        assert_eq!(h.peer.connect_count(), 1);
        assert_eq!(h.peer.close_count(), 1);
        assert_all_released(&h);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut never_started = harness();
        never_started.session.stop();
        never_started.session.stop();
        assert!(!never_started.session.is_active());

        let mut h = harness();
        h.session.start(|_| {}).await.unwrap();
        assert!(h.peer.accept());
        assert!(h.peer.send_audio(&chunk(1.0)));
        assert!(h.peer.send_audio(&chunk(1.0)));
        eventually(|| h.output.scheduled().len() == 2).await;

        h.session.stop();
        h.session.stop();

        let scheduled_ids: Vec<_> = h.output.scheduled().iter().map(|record| record.id).collect();
        assert_eq!(h.output.stopped(), scheduled_ids);
        assert_eq!(h.peer.close_count(), 1);
        assert_all_released(&h);
        assert_eq!(h.session.stats().active_buffers, 0);
    }

    #[tokio::test]
    async fn test_finished_buffers_leave_the_active_set() {
        let mut h = harness();
        h.session.start(|_| {}).await.unwrap();
        h.peer.accept();

        assert!(h.peer.send_audio(&chunk(1.0)));
        eventually(|| h.output.scheduled().len() == 1).await;
        assert_eq!(h.session.stats().active_buffers, 1);

        // Lecture terminée, aucun nouveau chunk
        h.output.set_time(10.0);
        assert_eq!(h.session.stats().active_buffers, 0);

        h.session.stop();
        assert!(h.output.stopped().is_empty());
        assert_all_released(&h);
    }

    #[tokio::test]
    async fn test_stop_skips_buffers_already_played() {
        let mut h = harness();
        h.session.start(|_| {}).await.unwrap();
        h.peer.accept();

        assert!(h.peer.send_audio(&chunk(1.0)));
        assert!(h.peer.send_audio(&chunk(1.0)));
        eventually(|| h.output.scheduled().len() == 2).await;

        // Le premier buffer (0 → 1 s) est fini, le second (1 → 2 s) joue
        h.output.set_time(1.5);
        h.session.stop();

        let second = h.output.scheduled()[1].id;
        assert_eq!(h.output.stopped(), vec![second]);
    }

    #[tokio::test]
    async fn test_already_active() {
        let mut h = harness();
        h.session.start(|_| {}).await.unwrap();

        let error = h.session.start(|_| {}).await.unwrap_err();
        assert!(matches!(error, LiveError::AlreadyActive));
        assert!(h.session.is_active());
        assert_eq!(h.peer.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_session_is_reusable_after_stop() {
        let mut h = harness();

        h.session.start(|_| {}).await.unwrap();
        h.session.stop();
        h.session.start(|_| {}).await.unwrap();

        assert!(h.session.is_active());
        assert_eq!(h.peer.connect_count(), 2);
        assert_eq!(h.output.contexts().acquired, 2);

        h.session.stop();
        assert_all_released(&h);
    }

    #[tokio::test]
    async fn test_back_to_back_chunks_are_gapless() {
        let mut h = harness();
        h.output.set_time(2.0);
        h.session.start(|_| {}).await.unwrap();
        h.peer.accept();

        for _ in 0..3 {
            assert!(h.peer.send_audio(&chunk(1.0)));
        }
        eventually(|| h.output.scheduled().len() == 3).await;

        let starts: Vec<f64> = h.output.scheduled().iter().map(|record| record.start_at).collect();
        assert_eq!(starts, vec![2.0, 3.0, 4.0]);
        assert_eq!(h.session.stats().next_start_time, 5.0);
    }

    #[tokio::test]
    async fn test_message_without_audio_changes_nothing() {
        let mut h = harness();
        h.session.start(|_| {}).await.unwrap();
        h.peer.accept();

        let turn_complete = ServerMessage::from_json(r#"{"serverContent":{"turnComplete":true}}"#).unwrap();
        assert!(h.peer.push_event(ServerEvent::Message(turn_complete)));
        eventually(|| h.session.stats().messages_received == 2).await;

        let stats = h.session.stats();
        assert!(h.output.scheduled().is_empty());
        assert_eq!(stats.next_start_time, 0.0);
        assert_eq!(stats.payload_errors, 0);
        assert!(h.session.is_active());
    }

    #[tokio::test]
    async fn test_invalid_payload_is_not_terminal() {
        let mut h = harness();
        let terminations = Terminations::default();
        h.session.start(terminations.callback()).await.unwrap();
        h.peer.accept();

        assert!(h.peer.send_audio("pas du base64 !"));
        eventually(|| h.session.stats().payload_errors == 1).await;

        assert!(h.output.scheduled().is_empty());
        assert!(h.session.is_active());
        assert!(terminations.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gapless_ordering_with_random_clock() {
        let mut rng = fastrand::Rng::with_seed(42);
        let mut h = harness();
        h.session.start(|_| {}).await.unwrap();
        h.peer.accept();

        let mut clock = 0.0;
        for k in 0..25 {
            clock += rng.f64() * 0.6;
            h.output.set_time(clock);

            let seconds = 0.1 + rng.f64() * 0.9;
            assert!(h.peer.send_audio(&chunk(seconds)));
            eventually(|| h.output.scheduled().len() == k + 1).await;

            let record = &h.output.scheduled()[k];
            assert!(record.start_at >= clock, "démarrage dans le passé: {} < {}", record.start_at, clock);
        }

        let records = h.output.scheduled();
        for pair in records.windows(2) {
            let previous_end = pair[0].start_at + pair[0].duration;
            assert!(pair[1].start_at >= previous_end - 1e-9);
        }
    }

    #[tokio::test]
    async fn test_frames_queued_until_open_then_flushed() {
        let mut h = harness();
        h.session.start(|_| {}).await.unwrap();

        assert!(h.capture.feed(vec![0.25; 4096]));
        assert!(h.capture.feed(vec![-0.25; 4096]));
        eventually(|| h.session.stats().frames_captured == 2).await;
        assert!(h.peer.realtime_inputs().is_empty());

        h.peer.accept();
        eventually(|| h.peer.realtime_inputs().len() == 2).await;
        assert_eq!(h.session.connection_state(), ConnectionState::Open);

        assert!(h.capture.feed(vec![0.5; 4096]));
        eventually(|| h.peer.realtime_inputs().len() == 3).await;

        let inputs = h.peer.realtime_inputs();
        assert!(inputs.iter().all(|frame| frame.mime_type == "audio/pcm;rate=16000"));

        // Ordre de capture conservé
        let codec = PcmCodec::new(&AudioConfig::default());
        let first_samples: Vec<f32> = inputs
            .iter()
            .map(|frame| codec.decode(&frame.data).unwrap().samples[0])
            .collect();
        assert_eq!(first_samples, vec![0.25, -0.25, 0.5]);
        assert_eq!(h.session.stats().frames_sent, 3);
    }

    #[tokio::test]
    async fn test_capture_overruns_are_counted() {
        let mut h = harness();
        let config = LiveConfig {
            audio: AudioConfig {
                frame_queue_capacity: 1,
                ..AudioConfig::default()
            },
            ..LiveConfig::default()
        };
        h.session = h.session.with_config(config);
        h.session.start(|_| {}).await.unwrap();

        // La tâche de session ne tourne pas entre ces deux appels
        assert!(h.capture.feed(vec![0.1; 4096]));
        assert!(!h.capture.feed(vec![0.2; 4096]));

        eventually(|| h.session.stats().frames_captured == 1).await;
        assert_eq!(h.session.stats().capture_overruns, 1);

        h.session.stop();
        assert_eq!(h.session.stats().capture_overruns, 1);
    }

    #[tokio::test]
    async fn test_remote_close_notifies_once() {
        let mut h = harness();
        let terminations = Terminations::default();
        h.session.start(terminations.callback()).await.unwrap();
        h.peer.accept();

        assert!(h.peer.close_remotely(1000, "au revoir"));
        eventually(|| !terminations.calls().is_empty()).await;

        assert_eq!(
            terminations.calls(),
            vec![Termination::RemoteClosed {
                code: Some(1000),
                reason: "au revoir".to_string(),
            }]
        );
        assert!(!h.session.is_active());
        assert_all_released(&h);

        h.session.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(terminations.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_notifies_once() {
        let mut h = harness();
        let terminations = Terminations::default();
        h.session.start(terminations.callback()).await.unwrap();

        assert!(h.peer.fail_transport("connexion réinitialisée"));
        eventually(|| !terminations.calls().is_empty()).await;

        assert_eq!(
            terminations.calls(),
            vec![Termination::TransportError("connexion réinitialisée".to_string())]
        );
        assert_all_released(&h);

        // Une nouvelle session peut démarrer
        h.session.start(|_| {}).await.unwrap();
        assert!(h.session.is_active());
    }

    #[tokio::test]
    async fn test_stop_never_calls_terminate() {
        let mut h = harness();
        let terminations = Terminations::default();
        h.session.start(terminations.callback()).await.unwrap();
        h.peer.accept();

        h.session.stop();
        assert!(!h.peer.close_remotely(1000, "trop tard"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(terminations.calls().is_empty());
    }

    #[tokio::test]
    async fn test_drop_releases_everything() {
        let h = harness();
        let Harness {
            capture,
            output,
            peer,
            mut session,
        } = h;
        session.start(|_| {}).await.unwrap();
        drop(session);

        assert!(capture.microphones().is_balanced());
        assert!(output.contexts().is_balanced());
        assert_eq!(peer.close_count(), 1);
    }
}
