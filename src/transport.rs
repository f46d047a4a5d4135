//! The physical channel seam between the sensor logic and a BLE stack.
//!
//! [`crate::session::SensorTag`] and [`crate::imu::ImuMultiplexer`] only ever
//! talk to the device through [`Transport`], so they run unchanged against the
//! btleplug backend in [`crate::sensortag_client`] or an in-memory fake.

use std::future::Future;

use uuid::Uuid;

use crate::error::TransportError;

/// Callback invoked with the raw bytes of every notification on a subscribed
/// characteristic.
///
/// Handlers run inline in the transport's single notification-delivery
/// context; they must not block.
pub type NotificationHandler = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Write / subscribe / unsubscribe on characteristics identified by UUID.
///
/// Implementations own timeouts and retries; callers treat every error as
/// final for that call.
pub trait Transport: Send + Sync + 'static {
    /// Write `bytes` to a configuration characteristic.
    fn write_configuration(
        &self,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Enable notifications on `characteristic` and route them to `on_notify`.
    ///
    /// Subscribing again replaces the previous handler.
    fn subscribe(
        &self,
        characteristic: Uuid,
        on_notify: NotificationHandler,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Disable notifications on `characteristic` and drop its handler.
    fn unsubscribe(
        &self,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
