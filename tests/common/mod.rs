#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sensortag::error::TransportError;
use sensortag::transport::{NotificationHandler, Transport};
use uuid::Uuid;

/// One call made on the transport, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write(Uuid, Vec<u8>),
    Subscribe(Uuid),
    Unsubscribe(Uuid),
}

/// In-memory transport that records every call and can be told to reject
/// the next one of each kind.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    handlers: Mutex<HashMap<Uuid, NotificationHandler>>,
    fail_write: AtomicBool,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn subscribe_calls(&self, characteristic: Uuid) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Subscribe(characteristic))
            .count()
    }

    pub fn unsubscribe_calls(&self, characteristic: Uuid) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Unsubscribe(characteristic))
            .count()
    }

    /// Payloads written to `characteristic`, oldest first.
    pub fn writes(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(uuid, bytes) if uuid == characteristic => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn is_subscribed(&self, characteristic: Uuid) -> bool {
        self.handlers.lock().unwrap().contains_key(&characteristic)
    }

    pub fn fail_next_write(&self) {
        self.fail_write.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_subscribe(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_unsubscribe(&self) {
        self.fail_unsubscribe.store(true, Ordering::SeqCst);
    }

    /// Deliver a notification the way the BLE pump would. Returns `false`
    /// when nothing is subscribed to `characteristic`.
    pub fn notify(&self, characteristic: Uuid, data: &[u8]) -> bool {
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(&characteristic) {
            Some(handler) => {
                handler(data);
                true
            }
            None => false,
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn rejected(flag: &AtomicBool, what: &str) -> Result<(), TransportError> {
        if flag.swap(false, Ordering::SeqCst) {
            Err(TransportError::Rejected(format!("{what} rejected by mock")))
        } else {
            Ok(())
        }
    }
}

impl Transport for MockTransport {
    async fn write_configuration(
        &self,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.record(Call::Write(characteristic, bytes.to_vec()));
        Self::rejected(&self.fail_write, "write")
    }

    async fn subscribe(
        &self,
        characteristic: Uuid,
        on_notify: NotificationHandler,
    ) -> Result<(), TransportError> {
        self.record(Call::Subscribe(characteristic));
        Self::rejected(&self.fail_subscribe, "subscribe")?;
        self.handlers
            .lock()
            .unwrap()
            .insert(characteristic, on_notify);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), TransportError> {
        self.record(Call::Unsubscribe(characteristic));
        Self::rejected(&self.fail_unsubscribe, "unsubscribe")?;
        self.handlers.lock().unwrap().remove(&characteristic);
        Ok(())
    }
}

/// An 18-byte movement payload with the given raw X values for gyro, accel
/// and mag; Y and Z are zero.
pub fn movement_payload(gyro_x: i16, accel_x: i16, mag_x: i16) -> [u8; 18] {
    let mut buf = [0u8; 18];
    buf[0..2].copy_from_slice(&gyro_x.to_le_bytes());
    buf[6..8].copy_from_slice(&accel_x.to_le_bytes());
    buf[12..14].copy_from_slice(&mag_x.to_le_bytes());
    buf
}
