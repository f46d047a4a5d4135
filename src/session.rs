//! Channel registry for one connected SensorTag.
//!
//! A [`SensorTag`] owns everything that is scoped to a device session: the
//! transport handle, the [`ImuMultiplexer`] for the shared movement stream,
//! and the set of simple sensor streams currently subscribed. Nothing here is
//! global, so two sessions never see each other's channels.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use thiserror::Error;

use crate::error::{DecodeError, TransportError};
use crate::imu::{ImuChannel, ImuMultiplexer};
use crate::parse::{
    decode_humidity, decode_ir_temperature, decode_luxometer, decode_pressure, decode_simple_key,
};
use crate::protocol::{SENSOR_DISABLE, SENSOR_ENABLE};
use crate::transport::{NotificationHandler, Transport};
use crate::types::{
    ButtonState, ChannelReading, Humidity, Illuminance, IrTemperature, Pressure, Sensor, XyzSample,
};

// ── Channel ───────────────────────────────────────────────────────────────────

/// A logical channel a caller can enable and subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    IrTemperature,
    Humidity,
    Pressure,
    Luxometer,
    Gyroscope,
    Accelerometer,
    Magnetometer,
    Button,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::IrTemperature,
        Channel::Humidity,
        Channel::Pressure,
        Channel::Luxometer,
        Channel::Gyroscope,
        Channel::Accelerometer,
        Channel::Magnetometer,
        Channel::Button,
    ];

    /// The physical sensor service this channel is carried on.
    pub fn sensor(self) -> Sensor {
        match self {
            Channel::IrTemperature => Sensor::IrTemperature,
            Channel::Humidity => Sensor::Humidity,
            Channel::Pressure => Sensor::Pressure,
            Channel::Luxometer => Sensor::Luxometer,
            Channel::Gyroscope | Channel::Accelerometer | Channel::Magnetometer => {
                Sensor::Movement
            }
            Channel::Button => Sensor::SimpleKey,
        }
    }

    /// The multiplexed IMU channel, `None` for sensors with their own stream.
    pub fn imu(self) -> Option<ImuChannel> {
        match self {
            Channel::Gyroscope => Some(ImuChannel::Gyroscope),
            Channel::Accelerometer => Some(ImuChannel::Accelerometer),
            Channel::Magnetometer => Some(ImuChannel::Magnetometer),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::IrTemperature => "ir-temperature",
            Channel::Humidity => "humidity",
            Channel::Pressure => "pressure",
            Channel::Luxometer => "luxometer",
            Channel::Gyroscope => "gyroscope",
            Channel::Accelerometer => "accelerometer",
            Channel::Magnetometer => "magnetometer",
            Channel::Button => "button",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown channel `{0}`")]
pub struct ParseChannelError(String);

impl FromStr for Channel {
    type Err = ParseChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Channel::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseChannelError(s.to_owned()))
    }
}

// ── SensorTag ─────────────────────────────────────────────────────────────────

/// A device session: enable, subscribe and unsubscribe per channel.
///
/// Simple sensors map one-to-one onto a data characteristic. The three IMU
/// channels are delegated to the session's [`ImuMultiplexer`].
pub struct SensorTag<T> {
    transport: Arc<T>,
    imu: ImuMultiplexer<T>,
    streams: Mutex<HashSet<Sensor>>,
}

impl<T: Transport> SensorTag<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            imu: ImuMultiplexer::new(Arc::clone(&transport)),
            transport,
            streams: Mutex::new(HashSet::new()),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn imu(&self) -> &ImuMultiplexer<T> {
        &self.imu
    }

    /// `true` while notifications for `channel` are being delivered.
    pub fn is_subscribed(&self, channel: Channel) -> bool {
        match channel.imu() {
            Some(ch) => self.imu.is_subscribed(ch),
            None => self.streams().contains(&channel.sensor()),
        }
    }

    // ── Channel-keyed API ─────────────────────────────────────────────────────

    /// Switch the sensor behind `channel` on.
    ///
    /// The button has no configuration characteristic and is always on.
    pub async fn enable(&self, channel: Channel) -> Result<(), TransportError> {
        match channel.imu() {
            Some(ch) => self.imu.enable(ch).await,
            None => self.write_config(channel.sensor(), SENSOR_ENABLE).await,
        }
    }

    pub async fn disable(&self, channel: Channel) -> Result<(), TransportError> {
        match channel.imu() {
            Some(ch) => self.imu.disable(ch).await,
            None => self.write_config(channel.sensor(), SENSOR_DISABLE).await,
        }
    }

    /// Deliver every reading on `channel` to `callback`.
    pub async fn subscribe<F>(&self, channel: Channel, callback: F) -> Result<(), TransportError>
    where
        F: Fn(ChannelReading) + Send + Sync + 'static,
    {
        match channel {
            Channel::IrTemperature => {
                self.subscribe_ir_temperature(move |r| callback(ChannelReading::IrTemperature(r)))
                    .await
            }
            Channel::Humidity => {
                self.subscribe_humidity(move |r| callback(ChannelReading::Humidity(r)))
                    .await
            }
            Channel::Pressure => {
                self.subscribe_pressure(move |r| callback(ChannelReading::Pressure(r)))
                    .await
            }
            Channel::Luxometer => {
                self.subscribe_luxometer(move |r| callback(ChannelReading::Luxometer(r)))
                    .await
            }
            Channel::Button => {
                self.subscribe_button(move |r| callback(ChannelReading::Button(r)))
                    .await
            }
            Channel::Gyroscope => {
                self.subscribe_imu(ImuChannel::Gyroscope, move |s| {
                    callback(ChannelReading::Gyroscope(s))
                })
                .await
            }
            Channel::Accelerometer => {
                self.subscribe_imu(ImuChannel::Accelerometer, move |s| {
                    callback(ChannelReading::Accelerometer(s))
                })
                .await
            }
            Channel::Magnetometer => {
                self.subscribe_imu(ImuChannel::Magnetometer, move |s| {
                    callback(ChannelReading::Magnetometer(s))
                })
                .await
            }
        }
    }

    pub async fn unsubscribe(&self, channel: Channel) -> Result<(), TransportError> {
        match channel.imu() {
            Some(ch) => self.imu.unsubscribe(ch).await,
            None => self.unsubscribe_stream(channel.sensor()).await,
        }
    }

    // ── Typed subscriptions ───────────────────────────────────────────────────

    pub async fn subscribe_ir_temperature<F>(&self, callback: F) -> Result<(), TransportError>
    where
        F: Fn(IrTemperature) + Send + Sync + 'static,
    {
        self.subscribe_stream(Sensor::IrTemperature, decode_ir_temperature, callback)
            .await
    }

    pub async fn subscribe_humidity<F>(&self, callback: F) -> Result<(), TransportError>
    where
        F: Fn(Humidity) + Send + Sync + 'static,
    {
        self.subscribe_stream(Sensor::Humidity, decode_humidity, callback)
            .await
    }

    /// Barometer readings; the firmware layout is picked per notification.
    pub async fn subscribe_pressure<F>(&self, callback: F) -> Result<(), TransportError>
    where
        F: Fn(Pressure) + Send + Sync + 'static,
    {
        self.subscribe_stream(Sensor::Pressure, decode_pressure, callback)
            .await
    }

    pub async fn subscribe_luxometer<F>(&self, callback: F) -> Result<(), TransportError>
    where
        F: Fn(Illuminance) + Send + Sync + 'static,
    {
        self.subscribe_stream(Sensor::Luxometer, decode_luxometer, callback)
            .await
    }

    pub async fn subscribe_button<F>(&self, callback: F) -> Result<(), TransportError>
    where
        F: Fn(ButtonState) + Send + Sync + 'static,
    {
        self.subscribe_stream(Sensor::SimpleKey, decode_simple_key, callback)
            .await
    }

    pub async fn subscribe_imu<F>(&self, channel: ImuChannel, callback: F) -> Result<(), TransportError>
    where
        F: Fn(XyzSample) + Send + Sync + 'static,
    {
        self.imu.subscribe(channel, callback).await
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Unsubscribe every active stream and reset the IMU channels.
    ///
    /// Every stream is attempted even if an earlier one fails; the first
    /// error is returned.
    pub async fn close(&self) -> Result<(), TransportError> {
        let active: Vec<Sensor> = self.streams().iter().copied().collect();
        let mut first_error = None;

        for sensor in active {
            if let Err(e) = self.unsubscribe_stream(sensor).await {
                warn!("{sensor}: unsubscribe failed during close: {e}");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.imu.shutdown().await {
            warn!("movement: shutdown failed during close: {e}");
            first_error.get_or_insert(e);
        }

        first_error.map_or(Ok(()), Err)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn streams(&self) -> MutexGuard<'_, HashSet<Sensor>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn write_config(&self, sensor: Sensor, value: u8) -> Result<(), TransportError> {
        match sensor.config_characteristic() {
            Some(uuid) => self.transport.write_configuration(uuid, &[value]).await,
            None => {
                debug!("{sensor} has no configuration characteristic, nothing to write");
                Ok(())
            }
        }
    }

    async fn subscribe_stream<R, F>(
        &self,
        sensor: Sensor,
        decode: fn(&[u8]) -> Result<R, DecodeError>,
        callback: F,
    ) -> Result<(), TransportError>
    where
        R: 'static,
        F: Fn(R) + Send + Sync + 'static,
    {
        let handler: NotificationHandler = Box::new(move |data: &[u8]| match decode(data) {
            Ok(reading) => callback(reading),
            Err(e) => warn!("{sensor}: dropping notification: {e}"),
        });
        self.transport
            .subscribe(sensor.data_characteristic(), handler)
            .await?;
        self.streams().insert(sensor);
        debug!("{sensor}: subscribed");
        Ok(())
    }

    async fn unsubscribe_stream(&self, sensor: Sensor) -> Result<(), TransportError> {
        self.transport
            .unsubscribe(sensor.data_characteristic())
            .await?;
        self.streams().remove(&sensor);
        debug!("{sensor}: unsubscribed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(channel.name().parse::<Channel>(), Ok(channel));
        }
        assert_eq!(" Gyroscope ".parse::<Channel>(), Ok(Channel::Gyroscope));
        assert_eq!(
            "barometer".parse::<Channel>(),
            Err(ParseChannelError("barometer".into()))
        );
    }

    #[test]
    fn imu_channels_share_movement_sensor() {
        let imu: Vec<_> = Channel::ALL.into_iter().filter_map(Channel::imu).collect();
        assert_eq!(imu, ImuChannel::ALL.to_vec());
        for channel in Channel::ALL {
            assert_eq!(channel.imu().is_some(), channel.sensor() == Sensor::Movement);
        }
    }
}
