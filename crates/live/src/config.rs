//! Configuration de la session vocale
//!
//! `LiveConfig` regroupe les paramètres audio et ceux envoyés à l'endpoint
//! à l'ouverture. `Language` ne change que l'instruction système : le format
//! audio est le même quelle que soit la langue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use audio::AudioConfig;
use network::{DEFAULT_MODEL, DEFAULT_VOICE, SessionSetup};

/// Configuration complète d'une session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub audio: AudioConfig,

    /// Modèle audio natif demandé à l'endpoint
    pub model: String,

    /// Voix synthétique prédéfinie
    pub voice_name: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
        }
    }
}

impl LiveConfig {
    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        self.audio.validate()?;

        if self.model.trim().is_empty() {
            return Err("Nom de modèle vide".to_string());
        }
        if self.voice_name.trim().is_empty() {
            return Err("Nom de voix vide".to_string());
        }

        Ok(())
    }

    /// Message de configuration envoyé à l'ouverture de la connexion
    pub fn session_setup(&self, language: Language) -> SessionSetup {
        SessionSetup {
            model: self.model.clone(),
            voice_name: self.voice_name.clone(),
            ..SessionSetup::new(language.system_instruction())
        }
    }
}

/// Langue de la conversation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Persian,
    English,
}

impl Language {
    /// Instruction système du conseiller formation
    pub fn system_instruction(&self) -> &'static str {
        match self {
            Language::Persian => PERSIAN_INSTRUCTION,
            Language::English => ENGLISH_INSTRUCTION,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Persian => f.write_str("persian"),
            Language::English => f.write_str("english"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fa" | "persian" | "farsi" => Ok(Language::Persian),
            "en" | "english" => Ok(Language::English),
            other => Err(format!("Langue inconnue: {} (fa ou en)", other)),
        }
    }
}

const PERSIAN_INSTRUCTION: &str = "\
شما مشاور ارشد آموزش و توسعه منابع انسانی در صنعت فولاد هستید و برای شرکت «دانیال استیل»، \
تولیدکننده مقاطع فولادی، کار می‌کنید.
در این گفتگوی صوتی:
1. برای اپراتورهای خط تولید، تکنیسین‌ها و مدیران مسیر یادگیری پیشنهاد دهید.
2. سرفصل‌های آموزشی منطبق با استانداردهای روز صنعت فولاد تهیه کنید.
3. نیازهای آموزشی را تحلیل کنید و راهکار بهبود عملکرد ارائه دهید.
4. به پرسش‌های فنی و مدیریتی آموزش در کارخانه‌های صنعتی پاسخ دهید.
همیشه به زبان فارسی، محترمانه، دقیق و کوتاه پاسخ دهید.";

const ENGLISH_INSTRUCTION: &str = "\
You are a senior HR training and development consultant for the steel industry, working for \
Danial Steel, a manufacturer of steel sections.
In this voice conversation:
1. Recommend learning paths for production line operators, technicians and managers.
2. Draft training curricula aligned with current steel industry standards.
3. Analyse training needs and propose ways to improve performance.
4. Answer technical and managerial questions about training in industrial plants.
Always reply in English, politely, precisely and concisely.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LiveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.voice_name, DEFAULT_VOICE);
    }

    #[test]
    fn test_invalid_config() {
        let config = LiveConfig {
            voice_name: " ".to_string(),
            ..LiveConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_language_only_changes_instruction() {
        let config = LiveConfig::default();
        let persian = config.session_setup(Language::Persian);
        let english = config.session_setup(Language::English);

        assert_eq!(persian.model, english.model);
        assert_eq!(persian.voice_name, english.voice_name);
        assert_eq!(persian.response_modality, english.response_modality);
        assert_ne!(persian.system_instruction, english.system_instruction);
        assert!(persian.system_instruction.contains("فارسی"));
        assert!(english.system_instruction.contains("Danial Steel"));
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("fa".parse::<Language>(), Ok(Language::Persian));
        assert_eq!("English".parse::<Language>(), Ok(Language::English));
        assert!("de".parse::<Language>().is_err());
        assert_eq!(Language::English.to_string(), "english");
    }

    #[test]
    fn test_partial_config_deserialization() {
        let config: LiveConfig = serde_json::from_str(r#"{"voice_name":"Kore","audio":{"frame_size":2048}}"#).unwrap();
        assert_eq!(config.voice_name, "Kore");
        assert_eq!(config.audio.frame_size, 2048);
        assert_eq!(config.model, DEFAULT_MODEL);
    }
}
