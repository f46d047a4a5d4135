//! Logical accelerometer, gyroscope and magnetometer channels on top of the
//! single MPU9250 movement stream.
//!
//! The SensorTag delivers all nine axes in one 18-byte notification on
//! [`MOVEMENT_DATA`]. [`ImuMultiplexer`] reference-counts the logical channel
//! subscriptions so the physical stream is subscribed exactly once while any
//! channel is active, and fans each decoded notification out to the
//! callbacks whose channel is both subscribed and enabled.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::error::TransportError;
use crate::parse::decode_movement;
use crate::protocol::{
    ACCELEROMETER_MASK, GYROSCOPE_MASK, MAGNETOMETER_MASK, MOVEMENT_CONFIG, MOVEMENT_DATA,
    MOVEMENT_ENABLE_ALL, SENSOR_DISABLE,
};
use crate::transport::{NotificationHandler, Transport};
use crate::types::{ImuSample, XyzSample};

/// Callback receiving one channel's triplet from every movement notification.
pub type TripletCallback = Arc<dyn Fn(XyzSample) + Send + Sync + 'static>;

// ── ImuChannel ────────────────────────────────────────────────────────────────

/// A logical sensor carried by the movement stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImuChannel {
    Gyroscope,
    Accelerometer,
    Magnetometer,
}

impl ImuChannel {
    pub const ALL: [ImuChannel; 3] = [
        ImuChannel::Gyroscope,
        ImuChannel::Accelerometer,
        ImuChannel::Magnetometer,
    ];

    /// Enable bits this channel contributes to the movement configuration.
    pub fn mask(self) -> ImuChannelMask {
        match self {
            ImuChannel::Gyroscope => ImuChannelMask(GYROSCOPE_MASK),
            ImuChannel::Accelerometer => ImuChannelMask(ACCELEROMETER_MASK),
            ImuChannel::Magnetometer => ImuChannelMask(MAGNETOMETER_MASK),
        }
    }

    /// This channel's triplet out of a decoded notification.
    pub fn select(self, sample: &ImuSample) -> XyzSample {
        match self {
            ImuChannel::Gyroscope => sample.gyro,
            ImuChannel::Accelerometer => sample.accel,
            ImuChannel::Magnetometer => sample.mag,
        }
    }
}

impl fmt::Display for ImuChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImuChannel::Gyroscope => "gyroscope",
            ImuChannel::Accelerometer => "accelerometer",
            ImuChannel::Magnetometer => "magnetometer",
        })
    }
}

// ── ImuChannelMask ────────────────────────────────────────────────────────────

/// OR-combination of [`ImuChannel::mask`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImuChannelMask(u16);

impl ImuChannelMask {
    pub const EMPTY: ImuChannelMask = ImuChannelMask(0);

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `true` if any bit of `other` is set in `self`.
    pub fn intersects(self, other: ImuChannelMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn remove(&mut self, other: ImuChannelMask) {
        self.0 &= !other.0;
    }
}

impl BitOr for ImuChannelMask {
    type Output = ImuChannelMask;

    fn bitor(self, rhs: Self) -> Self {
        ImuChannelMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ImuChannelMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ImuChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// State read by the notification dispatcher and written by transitions.
#[derive(Default)]
struct MuxState {
    enabled_mask: ImuChannelMask,
    /// Number of occupied callback slots.
    subscriber_count: u32,
    gyro: Option<TripletCallback>,
    accel: Option<TripletCallback>,
    mag: Option<TripletCallback>,
}

impl MuxState {
    fn slot(&self, channel: ImuChannel) -> &Option<TripletCallback> {
        match channel {
            ImuChannel::Gyroscope => &self.gyro,
            ImuChannel::Accelerometer => &self.accel,
            ImuChannel::Magnetometer => &self.mag,
        }
    }

    fn slot_mut(&mut self, channel: ImuChannel) -> &mut Option<TripletCallback> {
        match channel {
            ImuChannel::Gyroscope => &mut self.gyro,
            ImuChannel::Accelerometer => &mut self.accel,
            ImuChannel::Magnetometer => &mut self.mag,
        }
    }
}

fn lock(state: &Mutex<MuxState>) -> MutexGuard<'_, MuxState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decode one movement notification and hand each triplet to its callback.
///
/// The mask and slots are snapshotted under the lock; callbacks run after it
/// is released so they may query the multiplexer.
fn dispatch(state: &Mutex<MuxState>, data: &[u8]) {
    let sample = match decode_movement(data) {
        Ok(s) => s,
        Err(e) => {
            warn!("movement: dropping notification: {e}");
            return;
        }
    };

    let targets: Vec<(ImuChannel, TripletCallback)> = {
        let state = lock(state);
        ImuChannel::ALL
            .into_iter()
            .filter(|&ch| state.enabled_mask.intersects(ch.mask()))
            .filter_map(|ch| state.slot(ch).clone().map(|cb| (ch, cb)))
            .collect()
    };

    for (channel, callback) in targets {
        callback(channel.select(&sample));
    }
}

// ── ImuMultiplexer ────────────────────────────────────────────────────────────

/// Per-session owner of the movement stream and its three logical channels.
///
/// Transitions (`enable`, `disable`, `subscribe`, `unsubscribe`, `shutdown`)
/// are serialised, so a physical subscribe issued by one call can never race
/// a physical unsubscribe issued by another. A transition whose physical
/// action fails is rolled back before the error is returned.
pub struct ImuMultiplexer<T> {
    transport: Arc<T>,
    state: Arc<Mutex<MuxState>>,
    transitions: tokio::sync::Mutex<()>,
}

impl<T: Transport> ImuMultiplexer<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(MuxState::default())),
            transitions: tokio::sync::Mutex::new(()),
        }
    }

    /// Mask of every channel enabled so far.
    pub fn enabled_mask(&self) -> ImuChannelMask {
        lock(&self.state).enabled_mask
    }

    /// Number of logical channels currently subscribed.
    pub fn subscriber_count(&self) -> u32 {
        lock(&self.state).subscriber_count
    }

    pub fn is_subscribed(&self, channel: ImuChannel) -> bool {
        lock(&self.state).slot(channel).is_some()
    }

    /// Add `channel` to the enabled mask and switch the MPU9250 on.
    ///
    /// The configuration write is always [`MOVEMENT_ENABLE_ALL`]; which
    /// triplets reach callers is decided by the mask at dispatch time.
    pub async fn enable(&self, channel: ImuChannel) -> Result<(), TransportError> {
        let _transition = self.transitions.lock().await;

        let previous = {
            let mut state = lock(&self.state);
            let previous = state.enabled_mask;
            state.enabled_mask |= channel.mask();
            previous
        };

        let result = self
            .transport
            .write_configuration(MOVEMENT_CONFIG, &[MOVEMENT_ENABLE_ALL])
            .await;
        if result.is_err() {
            lock(&self.state).enabled_mask = previous;
        }
        result
    }

    /// Remove `channel` from the enabled mask. Powers the MPU9250 down once
    /// no channel is left enabled.
    pub async fn disable(&self, channel: ImuChannel) -> Result<(), TransportError> {
        let _transition = self.transitions.lock().await;

        let (previous, remaining) = {
            let mut state = lock(&self.state);
            let previous = state.enabled_mask;
            state.enabled_mask.remove(channel.mask());
            (previous, state.enabled_mask)
        };

        let config = if remaining.is_empty() {
            SENSOR_DISABLE
        } else {
            MOVEMENT_ENABLE_ALL
        };
        let result = self
            .transport
            .write_configuration(MOVEMENT_CONFIG, &[config])
            .await;
        if result.is_err() {
            lock(&self.state).enabled_mask = previous;
        }
        result
    }

    /// Route `channel`'s triplets to `callback`.
    ///
    /// The first active channel subscribes the physical stream; later ones
    /// only fill their slot. Subscribing an already subscribed channel
    /// replaces its callback.
    pub async fn subscribe<F>(&self, channel: ImuChannel, callback: F) -> Result<(), TransportError>
    where
        F: Fn(XyzSample) + Send + Sync + 'static,
    {
        let _transition = self.transitions.lock().await;

        let first = {
            let mut state = lock(&self.state);
            if state.slot_mut(channel).replace(Arc::new(callback)).is_some() {
                debug!("movement: replaced {channel} callback");
                return Ok(());
            }
            state.subscriber_count += 1;
            state.subscriber_count == 1
        };

        if first {
            debug!("movement: {channel} is the first channel, subscribing stream");
            if let Err(e) = self
                .transport
                .subscribe(MOVEMENT_DATA, self.dispatcher())
                .await
            {
                let mut state = lock(&self.state);
                *state.slot_mut(channel) = None;
                state.subscriber_count -= 1;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop routing `channel`'s triplets. The last active channel
    /// unsubscribes the physical stream. A channel that is not subscribed is
    /// left alone.
    pub async fn unsubscribe(&self, channel: ImuChannel) -> Result<(), TransportError> {
        let _transition = self.transitions.lock().await;

        let (removed, last) = {
            let mut state = lock(&self.state);
            let Some(removed) = state.slot_mut(channel).take() else {
                return Ok(());
            };
            state.subscriber_count -= 1;
            (removed, state.subscriber_count == 0)
        };

        if last {
            debug!("movement: {channel} was the last channel, unsubscribing stream");
            if let Err(e) = self.transport.unsubscribe(MOVEMENT_DATA).await {
                let mut state = lock(&self.state);
                *state.slot_mut(channel) = Some(removed);
                state.subscriber_count += 1;
                return Err(e);
            }
        }
        Ok(())
    }

    /// End of session: drop the physical subscription if there is one, then
    /// clear every slot and the mask.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let _transition = self.transitions.lock().await;

        let active = lock(&self.state).subscriber_count > 0;
        if active {
            self.transport.unsubscribe(MOVEMENT_DATA).await?;
        }
        *lock(&self.state) = MuxState::default();
        Ok(())
    }

    fn dispatcher(&self) -> NotificationHandler {
        let state = Arc::clone(&self.state);
        Box::new(move |data: &[u8]| dispatch(&state, data))
    }
}
