//! Transports vers l'endpoint conversationnel
//!
//! Ce module fournit deux implémentations du trait LiveConnector :
//! - WebSocketConnector : WebSocket réel (tokio-tungstenite, TLS natif)
//! - SimulatedConnector : Transport en mémoire piloté par un `SimulatedPeer`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tracing::{debug, info, warn};

use audio::EncodedFrame;

use crate::{
    ClientMessage, CloseInfo, ConnectionConfig, LiveConnection, LiveConnector, LiveLink, NetworkError,
    NetworkResult, ServerEvent, ServerMessage, SessionSetup,
};

/// Connecteur WebSocket vers l'API Live
///
/// # Architecture
/// - Une tâche d'écriture : envoie `setup` puis vide le canal sortant
/// - Une tâche de lecture : parse les messages JSON (texte ou binaire) en `ServerEvent`
///
/// # Example
/// ```rust,no_run
/// use network::{ConnectionConfig, LiveConnector, SessionSetup, WebSocketConnector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = WebSocketConnector::new(ConnectionConfig::with_api_key("..."));
/// let link = connector.connect(&SessionSetup::new("Réponds brièvement.")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    config: ConnectionConfig,
}

impl WebSocketConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

/// Commandes confiées à la tâche d'écriture
enum Outbound {
    Text(String),
    Close,
}

#[async_trait]
impl LiveConnector for WebSocketConnector {
    async fn connect(&self, setup: &SessionSetup) -> NetworkResult<LiveLink> {
        self.config.validate().map_err(NetworkError::ConfigError)?;

        let setup_json = setup.to_message().to_json()?;
        let url = self.config.endpoint_url();

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| NetworkError::connection_failed(&url, e))?;
        info!(model = %setup.model, voice = %setup.voice_name, "WebSocket connecté");

        let (writer, mut reader) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_writer(
            writer,
            setup_json,
            outbound_rx,
            events_tx.clone(),
            Arc::clone(&closed),
        ));

        let reader_closed = Arc::clone(&closed);
        let reader_task = tokio::spawn(async move {
            let terminal = loop {
                let Some(message) = reader.next().await else {
                    break ServerEvent::Closed(CloseInfo {
                        code: None,
                        reason: "connexion interrompue".to_string(),
                    });
                };

                match message {
                    Ok(Message::Text(text)) => forward(&events_tx, text.as_str()),
                    Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => forward(&events_tx, text),
                        Err(_) => warn!("Message binaire non UTF-8 ignoré ({} octets)", bytes.len()),
                    },
                    Ok(Message::Close(frame)) => {
                        let info = frame
                            .map(|frame| CloseInfo {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.as_str().to_string(),
                            })
                            .unwrap_or_default();
                        break ServerEvent::Closed(info);
                    }
                    Ok(_) => {} // Ping/Pong gérés par tungstenite
                    Err(e) => break ServerEvent::Error(NetworkError::from(e).to_string()),
                }
            };

            debug!("Fin de lecture WebSocket: {:?}", terminal);
            // Un seul événement terminal, que l'échec vienne de l'écriture ou de la lecture
            if !reader_closed.swap(true, Ordering::SeqCst) {
                let _ = events_tx.send(terminal);
            }
        });

        Ok(LiveLink {
            connection: Box::new(WebSocketConnection {
                outbound: outbound_tx,
                closed,
                reader_task: Some(reader_task),
            }),
            events: events_rx,
        })
    }
}

/// Tâche d'écriture : envoie `setup`, puis les commandes dans l'ordre
///
/// Un échec d'envoi ferme la connexion et produit un `ServerEvent::Error`.
async fn run_writer<S>(
    mut writer: S,
    setup_json: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ServerEvent>,
    closed: Arc<AtomicBool>,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    if let Err(e) = writer.send(Message::text(setup_json)).await {
        warn!("Envoi du setup impossible: {}", e);
        report_failure(&events, &closed, e);
        return;
    }

    while let Some(command) = outbound.recv().await {
        match command {
            Outbound::Text(json) => {
                if let Err(e) = writer.send(Message::text(json)).await {
                    warn!("Envoi WebSocket interrompu: {}", e);
                    report_failure(&events, &closed, e);
                    break;
                }
            }
            Outbound::Close => {
                let _ = writer.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Signale une panne de transport, sauf si la connexion est déjà fermée
fn report_failure(events: &mpsc::UnboundedSender<ServerEvent>, closed: &AtomicBool, error: tungstenite::Error) {
    if !closed.swap(true, Ordering::SeqCst) {
        let _ = events.send(ServerEvent::Error(NetworkError::from(error).to_string()));
    }
}

/// Parse un message texte et le transmet ; les messages illisibles sont ignorés
fn forward(events: &mpsc::UnboundedSender<ServerEvent>, text: &str) {
    match ServerMessage::from_json(text) {
        Ok(message) => {
            let _ = events.send(ServerEvent::Message(message));
        }
        Err(e) => warn!("Message serveur illisible ignoré: {}", e),
    }
}

/// Connexion WebSocket établie
struct WebSocketConnection {
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
}

impl LiveConnection for WebSocketConnection {
    fn send(&self, message: ClientMessage) -> NetworkResult<()> {
        if self.is_closed() {
            return Err(NetworkError::Closed);
        }

        let json = message.to_json()?;
        self.outbound
            .send(Outbound::Text(json))
            .map_err(|_| NetworkError::Closed)
    }

    fn close(&mut self) {
        let already_closed = self.closed.swap(true, Ordering::SeqCst);

        // La tâche d'écriture envoie la trame de fermeture puis se termine
        if !already_closed {
            let _ = self.outbound.send(Outbound::Close);
        }

        if let Some(reader) = self.reader_task.take() {
            reader.abort();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Default)]
struct SimulatedState {
    connect_failure: Option<String>,
    auto_accept: bool,
    connects: u32,
    closes: u32,
    remote_closed: bool,
    setups: Vec<SessionSetup>,
    sent: Vec<ClientMessage>,
    events: Option<mpsc::UnboundedSender<ServerEvent>>,
}

/// Connecteur en mémoire pour les tests
///
/// Chaque connexion est observable et pilotable via le `SimulatedPeer`
/// associé, qui joue le rôle de l'endpoint.
#[derive(Clone, Default)]
pub struct SimulatedConnector {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedConnector {
    /// Crée un connecteur et le pair qui le pilote
    pub fn new() -> (Self, SimulatedPeer) {
        let connector = Self::default();
        let peer = SimulatedPeer {
            state: Arc::clone(&connector.state),
        };
        (connector, peer)
    }

    /// Connecteur qui accuse la configuration dès la connexion
    pub fn auto_accepting() -> (Self, SimulatedPeer) {
        let (connector, peer) = Self::new();
        lock(&connector.state).auto_accept = true;
        (connector, peer)
    }
}

#[async_trait]
impl LiveConnector for SimulatedConnector {
    async fn connect(&self, setup: &SessionSetup) -> NetworkResult<LiveLink> {
        let mut state = lock(&self.state);
        if let Some(reason) = &state.connect_failure {
            return Err(NetworkError::connection_failed("simulated://live", reason));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if state.auto_accept {
            let _ = events_tx.send(ServerEvent::Message(ServerMessage::setup_complete()));
        }

        state.connects += 1;
        state.remote_closed = false;
        state.setups.push(setup.clone());
        state.events = Some(events_tx);

        Ok(LiveLink {
            connection: Box::new(SimulatedConnection {
                state: Arc::clone(&self.state),
                closed: false,
            }),
            events: events_rx,
        })
    }
}

struct SimulatedConnection {
    state: Arc<Mutex<SimulatedState>>,
    closed: bool,
}

impl LiveConnection for SimulatedConnection {
    fn send(&self, message: ClientMessage) -> NetworkResult<()> {
        let mut state = lock(&self.state);
        if self.closed || state.remote_closed {
            return Err(NetworkError::Closed);
        }
        state.sent.push(message);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = lock(&self.state);
            state.closes += 1;
            state.events = None;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed || lock(&self.state).remote_closed
    }
}

/// Côté endpoint d'un `SimulatedConnector`
#[derive(Clone)]
pub struct SimulatedPeer {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedPeer {
    /// Les prochaines connexions échouent avec la raison donnée
    pub fn fail_connect(&self, reason: &str) {
        lock(&self.state).connect_failure = Some(reason.to_string());
    }

    /// Envoie un événement à la connexion courante
    ///
    /// Retourne false si aucune connexion n'écoute.
    pub fn push_event(&self, event: ServerEvent) -> bool {
        let mut state = lock(&self.state);
        let delivered = match &state.events {
            Some(events) => events.send(event.clone()).is_ok(),
            None => false,
        };

        if delivered && event.is_terminal() {
            state.remote_closed = true;
            state.events = None;
        }
        delivered
    }

    /// Accuse la configuration (`setupComplete`)
    pub fn accept(&self) -> bool {
        self.push_event(ServerEvent::Message(ServerMessage::setup_complete()))
    }

    /// Envoie un chunk audio base64
    pub fn send_audio(&self, data: &str) -> bool {
        self.push_event(ServerEvent::Message(ServerMessage::audio(data)))
    }

    /// Ferme la connexion côté endpoint
    pub fn close_remotely(&self, code: u16, reason: &str) -> bool {
        self.push_event(ServerEvent::Closed(CloseInfo {
            code: Some(code),
            reason: reason.to_string(),
        }))
    }

    /// Simule une erreur transport
    pub fn fail_transport(&self, message: &str) -> bool {
        self.push_event(ServerEvent::Error(message.to_string()))
    }

    /// Configurations reçues, une par connexion
    pub fn setups(&self) -> Vec<SessionSetup> {
        lock(&self.state).setups.clone()
    }

    /// Frames audio reçues, dans l'ordre d'arrivée
    pub fn realtime_inputs(&self) -> Vec<EncodedFrame> {
        lock(&self.state)
            .sent
            .iter()
            .filter_map(|message| match message {
                ClientMessage::RealtimeInput(input) => Some(input.media_chunks.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Nombre de connexions établies
    pub fn connect_count(&self) -> u32 {
        lock(&self.state).connects
    }

    /// Nombre de fermetures demandées par le client
    pub fn close_count(&self) -> u32 {
        lock(&self.state).closes
    }

    /// Vérifie si une connexion écoute encore
    pub fn is_connected(&self) -> bool {
        lock(&self.state).events.is_some()
    }
}

fn lock(state: &Mutex<SimulatedState>) -> MutexGuard<'_, SimulatedState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
