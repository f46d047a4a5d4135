//! # sensortag-rs
//!
//! Async Rust client and telemetry codec for the
//! [TI CC2650 SensorTag](https://www.ti.com/tool/CC2650STK) over Bluetooth
//! Low Energy.
//!
//! ## Supported sensors
//!
//! | Sensor | Chip | Channel(s) | Payload |
//! |---|---|---|---|
//! | IR temperature | TMP007 | `ir-temperature` | 4 bytes, two 1/128 °C words |
//! | Humidity | HDC1000 | `humidity` | 4 bytes, raw temperature + RH |
//! | Barometer | BMP280 | `pressure` | 4 bytes (fw 0.89) or 6 bytes (fw ≥ 1.01) |
//! | Luxometer | OPT3001 | `luxometer` | 4 bytes |
//! | Movement | MPU9250 | `gyroscope`, `accelerometer`, `magnetometer` | 18 bytes, one shared stream |
//! | Simple key | n/a | `button` | 1 byte |
//!
//! The barometer layout is chosen per notification from the payload length,
//! so both firmware generations work without configuration.
//!
//! ## Quick start
//!
//! ```no_run
//! use sensortag::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SensorTagClient::new(SensorTagClientConfig::default());
//!     let tag = client.connect().await?;
//!
//!     tag.enable(Channel::Gyroscope).await?;
//!     tag.subscribe(Channel::Gyroscope, |reading| println!("{reading:?}")).await?;
//!
//!     tag.transport().wait_disconnected().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`sensortag_client`] | BLE scanning, connecting, and the btleplug [`sensortag_client::BleTransport`] |
//! | [`session`] | [`session::SensorTag`]: enable / subscribe / unsubscribe per channel |
//! | [`imu`] | Logical gyroscope, accelerometer and magnetometer channels over the movement stream |
//! | [`transport`] | The [`transport::Transport`] trait sessions run on |
//! | [`types`] | Decoded readings |
//! | [`protocol`] | GATT UUIDs, configuration bytes, channel masks and scale factors |
//! | [`parse`] | Pure byte-to-reading decoders |
//! | [`error`] | Decode and transport errors |

pub mod error;
pub mod imu;
pub mod parse;
pub mod protocol;
pub mod sensortag_client;
pub mod session;
pub mod transport;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
///
/// ```no_run
/// use sensortag::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let client = SensorTagClient::new(SensorTagClientConfig::default());
/// for device in client.scan_all().await? {
///     println!("{}  {}", device.name, device.id);
/// }
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    // ── Client and session ────────────────────────────────────────────────────
    pub use crate::sensortag_client::{
        BleTransport, SensorTagClient, SensorTagClientConfig, SensorTagDevice,
    };
    pub use crate::session::{Channel, SensorTag};
    pub use crate::imu::{ImuChannel, ImuChannelMask, ImuMultiplexer};
    pub use crate::transport::{NotificationHandler, Transport};

    // ── Readings ──────────────────────────────────────────────────────────────
    pub use crate::types::{
        ButtonState, ChannelReading, Humidity, Illuminance, ImuSample, IrTemperature,
        PhysicalReading, Pressure, Sensor, XyzSample,
    };

    // ── Errors ────────────────────────────────────────────────────────────────
    pub use crate::error::{DecodeError, TransportError};
}
