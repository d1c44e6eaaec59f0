//! Inventaire des périphériques audio
//!
//! Utilisé par le CLI pour afficher ce que la session va utiliser
//! avant de démarrer une conversation.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::capture::device_label;
use crate::{AudioError, AudioResult};

/// Sens d'un périphérique
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Description d'un périphérique audio
#[derive(Clone, Debug, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub direction: DeviceDirection,
    pub is_default: bool,
    /// Configuration par défaut, si le périphérique répond
    pub default_sample_rate: Option<u32>,
    pub default_channels: Option<u16>,
}

/// Liste les entrées puis les sorties de l'host par défaut
pub fn list_devices() -> AudioResult<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_input = host.default_input_device().map(|d| device_label(&d));
    let default_output = host.default_output_device().map(|d| device_label(&d));

    let mut devices = Vec::new();

    let inputs = host.input_devices().map_err(|_| AudioError::CapabilityUnavailable)?;
    for device in inputs {
        let name = device_label(&device);
        let config = device.default_input_config().ok();
        devices.push(DeviceInfo {
            is_default: default_input.as_deref() == Some(name.as_str()),
            name,
            direction: DeviceDirection::Input,
            default_sample_rate: config.as_ref().map(|c| c.sample_rate()),
            default_channels: config.as_ref().map(|c| c.channels()),
        });
    }

    let outputs = host
        .output_devices()
        .map_err(|e| AudioError::InitializationError(format!("Énumération des sorties impossible : {}", e)))?;
    for device in outputs {
        let name = device_label(&device);
        let config = device.default_output_config().ok();
        devices.push(DeviceInfo {
            is_default: default_output.as_deref() == Some(name.as_str()),
            name,
            direction: DeviceDirection::Output,
            default_sample_rate: config.as_ref().map(|c| c.sample_rate()),
            default_channels: config.as_ref().map(|c| c.channels()),
        });
    }

    Ok(devices)
}
