//! Error types shared by the codec, the multiplexer and the BLE transport.

use thiserror::Error;
use uuid::Uuid;

use crate::types::Sensor;

/// A notification payload that cannot be turned into a reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is shorter than the modality's fixed layout.
    #[error("{sensor} payload too short: need {needed} bytes, got {actual}")]
    BufferTooShort {
        sensor: Sensor,
        needed: usize,
        actual: usize,
    },

    /// A pressure payload whose length matches neither firmware layout.
    #[error("unsupported barometer payload layout ({len} bytes)")]
    UnsupportedFirmwareLayout { len: usize },
}

/// Failure reported by the physical channel collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connected peripheral does not expose this characteristic.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error(transparent)]
    Ble(#[from] btleplug::Error),

    /// Opaque rejection from a non-BLE transport.
    #[error("transport rejected request: {0}")]
    Rejected(String),

    #[error("peripheral disconnected")]
    Disconnected,
}
