//! Manager de connexion streaming
//!
//! Ce module porte la machine d'états de la connexion (connecting → open →
//! closed) et la file d'attente des frames capturées avant que l'endpoint
//! n'ait accepté la session.

use std::collections::VecDeque;

use tracing::{debug, info, warn};
use audio::EncodedFrame;

use crate::{ClientMessage, ConnectionState, LiveConnection, NetworkError, NetworkResult, ServerEvent};

/// Statistiques d'émission de la connexion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames confiées au transport
    pub frames_sent: u64,

    /// Frames passées par la file d'attente puis envoyées à l'ouverture
    pub frames_flushed: u64,

    /// Frames perdues car la file d'attente était pleine
    pub frames_dropped: u64,
}

/// Manager de la connexion vers l'endpoint
///
/// Les frames envoyées pendant `Connecting` sont mises en file et partent,
/// dans l'ordre de capture, dès que la session est acceptée. Une fois
/// `Closed`, plus rien ne part.
pub struct ConnectionManager {
    connection: Box<dyn LiveConnection>,
    state: ConnectionState,
    outbound: OutboundQueue,
    stats: ConnectionStats,
}

impl ConnectionManager {
    /// Prend possession d'une connexion fraîchement établie
    pub fn new(connection: Box<dyn LiveConnection>, queue_capacity: usize) -> Self {
        Self {
            connection,
            state: ConnectionState::Connecting,
            outbound: OutboundQueue::new(queue_capacity),
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Nombre de frames en attente d'ouverture
    pub fn queued_frames(&self) -> usize {
        self.outbound.len()
    }

    /// Envoie une frame audio, ou la met en attente si la session n'est pas encore ouverte
    ///
    /// # Erreurs
    /// - `NetworkError::InvalidState` : La connexion est fermée
    /// - `NetworkError::Closed` : Le transport a refusé le message
    pub fn send_frame(&mut self, frame: EncodedFrame) -> NetworkResult<()> {
        match self.state {
            ConnectionState::Open => {
                self.connection.send(ClientMessage::realtime_audio(frame))?;
                self.stats.frames_sent += 1;
                Ok(())
            }
            ConnectionState::Connecting => {
                if !self.outbound.push(frame) {
                    self.stats.frames_dropped += 1;
                    debug!("File d'attente pleine, frame la plus ancienne perdue");
                }
                Ok(())
            }
            ConnectionState::Closed => Err(NetworkError::invalid_state("send_frame", self.state)),
        }
    }

    /// Passe en `Open` et vide la file d'attente dans l'ordre
    ///
    /// Retourne le nombre de frames envoyées depuis la file.
    pub fn mark_open(&mut self) -> NetworkResult<usize> {
        match self.state {
            ConnectionState::Open => return Ok(0),
            ConnectionState::Closed => return Err(NetworkError::invalid_state("mark_open", self.state)),
            ConnectionState::Connecting => {}
        }

        self.state = ConnectionState::Open;

        let mut flushed = 0;
        for frame in self.outbound.drain() {
            self.connection.send(ClientMessage::realtime_audio(frame))?;
            self.stats.frames_sent += 1;
            self.stats.frames_flushed += 1;
            flushed += 1;
        }

        info!("Session ouverte ({} frames en attente envoyées)", flushed);
        Ok(flushed)
    }

    /// Met à jour l'état selon un événement de l'endpoint
    ///
    /// `setupComplete` ouvre la session ; une fermeture ou une erreur
    /// transport la ferme.
    pub fn on_server_event(&mut self, event: &ServerEvent) -> NetworkResult<()> {
        match event {
            ServerEvent::Message(message) if message.is_setup_complete() => {
                self.mark_open()?;
            }
            ServerEvent::Message(message) => {
                if let Some(go_away) = &message.go_away {
                    warn!("L'endpoint annonce une fermeture prochaine ({:?})", go_away.time_left);
                }
            }
            ServerEvent::Closed(_) | ServerEvent::Error(_) => self.close(),
        }
        Ok(())
    }

    /// Ferme la connexion (idempotent)
    pub fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }

        self.connection.close();
        self.outbound.clear();
        self.state = ConnectionState::Closed;
        debug!("Connexion fermée");
    }
}

/// File FIFO bornée des frames en attente d'ouverture
///
/// Au-delà de la capacité, la frame la plus ancienne est abandonnée.
#[derive(Debug)]
pub struct OutboundQueue {
    frames: VecDeque<EncodedFrame>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Ajoute une frame en fin de file
    ///
    /// Retourne false si une frame ancienne a dû être abandonnée.
    pub fn push(&mut self, frame: EncodedFrame) -> bool {
        let mut kept_all = true;
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            kept_all = false;
        }
        self.frames.push_back(frame);
        kept_all
    }

    /// Vide la file dans l'ordre d'arrivée
    pub fn drain(&mut self) -> impl Iterator<Item = EncodedFrame> + '_ {
        self.frames.drain(..)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
