//! Types de données pour la connexion streaming
//!
//! Ce module définit :
//! - ConnectionState : États de la connexion (connecting → open → closed)
//! - ConnectionConfig / SessionSetup : Où se connecter et avec quels paramètres
//! - ClientMessage : Messages JSON envoyés à l'endpoint (setup, entrée temps réel)
//! - ServerMessage / ServerEvent : Ce que l'endpoint renvoie

use std::fmt;

use serde::{Deserialize, Serialize};
use audio::EncodedFrame;

/// Endpoint WebSocket de l'API Live (BidiGenerateContent)
pub const GEMINI_LIVE_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Modèle audio natif utilisé par défaut
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Voix synthétique utilisée par défaut
pub const DEFAULT_VOICE: &str = "Zephyr";

/// États de la connexion streaming
///
/// `Connecting` couvre la fenêtre entre la poignée de main transport et
/// l'accusé `setupComplete` de l'endpoint. Les frames capturées pendant
/// cette fenêtre sont mises en attente, pas perdues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// Transport ouvert, configuration pas encore acceptée
    Connecting,

    /// Session acceptée, l'audio circule
    Open,

    /// Connexion fermée (par nous ou par l'endpoint)
    Closed,
}

impl ConnectionState {
    /// Vérifie si l'audio peut être envoyé directement
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Vérifie si la connexion est terminée
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    /// Description textuelle de l'état pour l'UI
    pub fn description(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connexion en cours",
            ConnectionState::Open => "Session ouverte",
            ConnectionState::Closed => "Fermée",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Où joindre l'endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// URL WebSocket (ws:// ou wss://)
    pub url: String,

    /// Clé d'API, ajoutée en paramètre `key` de l'URL
    ///
    /// Jamais sérialisée : elle vient de l'environnement.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: GEMINI_LIVE_URL.to_string(),
            api_key: None,
        }
    }
}

impl ConnectionConfig {
    /// Configuration vers l'endpoint par défaut avec une clé d'API
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// URL complète, clé d'API incluse
    pub fn endpoint_url(&self) -> String {
        match &self.api_key {
            Some(key) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}key={}", self.url, separator, key)
            }
            None => self.url.clone(),
        }
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(format!("URL invalide: {} (doit commencer par ws:// ou wss://)", self.url));
        }

        if matches!(&self.api_key, Some(key) if key.trim().is_empty()) {
            return Err("Clé d'API vide".to_string());
        }

        Ok(())
    }
}

/// Mode de réponse demandé à l'endpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseModality {
    #[default]
    Audio,
    Text,
}

/// Paramètres envoyés une seule fois à l'ouverture de la session
///
/// Ils ne sont jamais renégociés en cours de session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSetup {
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub response_modality: ResponseModality,
}

impl SessionSetup {
    /// Setup audio avec le modèle et la voix par défaut
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            system_instruction: system_instruction.into(),
            response_modality: ResponseModality::Audio,
        }
    }

    /// Message `setup` correspondant
    pub fn to_message(&self) -> ClientMessage {
        ClientMessage::Setup(SetupMessage {
            model: self.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec![self.response_modality],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: self.system_instruction.clone(),
                }],
            },
        })
    }
}

/// Messages envoyés à l'endpoint
///
/// Sérialisés en `{"setup": {...}}` ou `{"realtimeInput": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupMessage),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Entrée temps réel portant une frame audio
    pub fn realtime_audio(frame: EncodedFrame) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![frame],
        })
    }

    /// Sérialise le message en JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    pub speech_config: SpeechConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<EncodedFrame>,
}

/// Message reçu de l'endpoint
///
/// Structure volontairement permissive : les champs inconnus sont ignorés
/// et un message sans audio est parfaitement valide.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<SetupComplete>,

    #[serde(default)]
    pub server_content: Option<ServerContent>,

    #[serde(default)]
    pub go_away: Option<GoAway>,
}

impl ServerMessage {
    /// Parse un message JSON
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Message d'accusé de configuration
    pub fn setup_complete() -> Self {
        Self {
            setup_complete: Some(SetupComplete {}),
            ..Self::default()
        }
    }

    /// Message portant un chunk audio (base64)
    pub fn audio(data: impl Into<String>) -> Self {
        Self {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn {
                    parts: vec![ContentPart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "audio/pcm;rate=24000".to_string(),
                            data: data.into(),
                        }),
                    }],
                }),
                ..ServerContent::default()
            }),
            ..Self::default()
        }
    }

    /// Vérifie si l'endpoint confirme l'ouverture de la session
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Payload audio base64 du premier morceau inline, s'il existe
    pub fn audio_payload(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .iter()
            .find_map(|part| part.inline_data.as_ref())
            .map(|inline| inline.data.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SetupComplete {}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,

    #[serde(default)]
    pub turn_complete: bool,

    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ContentPart>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub inline_data: Option<InlineData>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

/// Préavis de fermeture envoyé par l'endpoint
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

/// Informations de fermeture
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloseInfo {
    /// Code de fermeture WebSocket, absent si la connexion a été coupée sans trame de fermeture
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseInfo {
    /// Fermeture normale (1000)
    pub fn normal() -> Self {
        Self {
            code: Some(1000),
            reason: String::new(),
        }
    }

    /// Vérifie si la fermeture est normale
    pub fn is_normal(&self) -> bool {
        self.code == Some(1000)
    }
}

/// Événements remontés par la connexion à la session
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// Message applicatif de l'endpoint
    Message(ServerMessage),

    /// L'endpoint a fermé la connexion
    Closed(CloseInfo),

    /// Erreur transport après l'établissement
    Error(String),
}

impl ServerEvent {
    /// Vérifie si l'événement termine la session
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::Closed(_) | ServerEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_message_wire_format() {
        let setup = SessionSetup {
            model: "models/test".to_string(),
            voice_name: "Kore".to_string(),
            system_instruction: "Sois bref".to_string(),
            response_modality: ResponseModality::Audio,
        };

        let value = serde_json::to_value(setup.to_message()).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/test",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Kore" } }
                        }
                    },
                    "systemInstruction": { "parts": [{ "text": "Sois bref" }] }
                }
            })
        );
    }

    #[test]
    fn test_realtime_input_wire_format() {
        let frame = EncodedFrame::new("AAA=".to_string(), "audio/pcm;rate=16000");
        let value = serde_json::to_value(ClientMessage::realtime_audio(frame)).unwrap();

        assert_eq!(
            value,
            json!({
                "realtimeInput": {
                    "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": "AAA=" }]
                }
            })
        );
    }

    #[test]
    fn test_server_audio_extraction() {
        let text = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [{ "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQI=" } }]
                }
            }
        }"#;

        let message = ServerMessage::from_json(text).unwrap();
        assert_eq!(message.audio_payload(), Some("AQI="));
        assert!(!message.is_setup_complete());
    }

    #[test]
    fn test_server_message_without_audio() {
        let turn_complete = ServerMessage::from_json(r#"{"serverContent":{"turnComplete":true}}"#).unwrap();
        assert_eq!(turn_complete.audio_payload(), None);
        assert!(turn_complete.server_content.unwrap().turn_complete);

        let setup = ServerMessage::from_json(r#"{"setupComplete":{}}"#).unwrap();
        assert!(setup.is_setup_complete());
        assert_eq!(setup.audio_payload(), None);

        // Champs inconnus ignorés
        let usage = ServerMessage::from_json(r#"{"usageMetadata":{"totalTokenCount":12}}"#).unwrap();
        assert_eq!(usage, ServerMessage::default());
    }

    #[test]
    fn test_endpoint_url() {
        let config = ConnectionConfig::with_api_key("abc");
        assert!(config.endpoint_url().ends_with("BidiGenerateContent?key=abc"));
        assert!(config.validate().is_ok());

        let config = ConnectionConfig {
            url: "http://localhost".to_string(),
            api_key: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
        assert!(ConnectionState::Closed.is_closed());
        assert_eq!(ConnectionState::Connecting.to_string(), "Connexion en cours");
    }
}
