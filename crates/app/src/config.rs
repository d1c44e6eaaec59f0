// Configuration du CLI live-voice
//
// Un fichier TOML optionnel fournit l'endpoint et les réglages de session ;
// la clé d'API vient toujours de l'environnement.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use live::{Language, LiveConfig};
use network::ConnectionConfig;

/// Variables d'environnement consultées pour la clé d'API, dans l'ordre
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub live: LiveConfig,
    pub language: Language,
}

impl AppConfig {
    /// Charge le fichier s'il est donné, sinon les valeurs par défaut
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Lecture de {} impossible", path.display()))?;
                Self::from_toml(&text).with_context(|| format!("Configuration invalide dans {}", path.display()))?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Applique les options de ligne de commande
    pub fn apply_overrides(&mut self, language: Option<Language>, voice: Option<String>) {
        if let Some(language) = language {
            self.language = language;
        }
        if let Some(voice) = voice {
            self.live.voice_name = voice;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.connection.validate() {
            bail!(e);
        }
        if let Err(e) = self.live.validate() {
            bail!(e);
        }
        Ok(())
    }
}

/// Première clé d'API non vide trouvée dans l'environnement
pub fn api_key_from_env() -> Option<String> {
    API_KEY_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.language, Language::Persian);
        assert_eq!(config.connection.url, network::GEMINI_LIVE_URL);
        assert_eq!(config.live.audio.frame_size, 4096);
    }

    #[test]
    fn test_toml_overrides() {
        let config = AppConfig::from_toml(
            r#"
            language = "english"

            [connection]
            url = "ws://127.0.0.1:9000/live"

            [live]
            voice_name = "Kore"

            [live.audio]
            overflow = "wrap"
            "#,
        )
        .unwrap();

        assert_eq!(config.language, Language::English);
        assert_eq!(config.connection.url, "ws://127.0.0.1:9000/live");
        assert_eq!(config.live.voice_name, "Kore");
        assert_eq!(config.live.audio.overflow, audio::OverflowPolicy::Wrap);
        assert_eq!(config.live.audio.input_sample_rate, 16_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(Some(Language::English), Some("Puck".to_string()));

        assert_eq!(config.language, Language::English);
        assert_eq!(config.live.voice_name, "Puck");
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = AppConfig::from_toml("[connection]\nurl = \"https://example.com\"").unwrap();
        assert!(config.validate().is_err());
    }
}
