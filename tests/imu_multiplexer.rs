mod common;

use std::sync::{Arc, Mutex};

use common::{movement_payload, Call, MockTransport};
use sensortag::error::TransportError;
use sensortag::imu::{ImuChannel, ImuMultiplexer};
use sensortag::protocol::{MOVEMENT_CONFIG, MOVEMENT_DATA};
use sensortag::types::XyzSample;

type Seen = Arc<Mutex<Vec<(ImuChannel, XyzSample)>>>;

fn recorder(seen: &Seen, channel: ImuChannel) -> impl Fn(XyzSample) + Send + Sync + 'static {
    let seen = Arc::clone(seen);
    move |s: XyzSample| seen.lock().unwrap().push((channel, s))
}

#[tokio::test]
async fn two_channels_share_one_physical_subscription() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));

    mux.subscribe(ImuChannel::Accelerometer, |_: XyzSample| {}).await.unwrap();
    mux.subscribe(ImuChannel::Gyroscope, |_: XyzSample| {}).await.unwrap();
    assert_eq!(transport.subscribe_calls(MOVEMENT_DATA), 1);
    assert_eq!(mux.subscriber_count(), 2);

    mux.unsubscribe(ImuChannel::Accelerometer).await.unwrap();
    assert_eq!(transport.unsubscribe_calls(MOVEMENT_DATA), 0);
    assert!(transport.is_subscribed(MOVEMENT_DATA));
    assert_eq!(mux.subscriber_count(), 1);

    mux.unsubscribe(ImuChannel::Gyroscope).await.unwrap();
    assert_eq!(transport.unsubscribe_calls(MOVEMENT_DATA), 1);
    assert!(!transport.is_subscribed(MOVEMENT_DATA));
    assert_eq!(mux.subscriber_count(), 0);
}

#[tokio::test]
async fn only_enabled_and_subscribed_channels_receive_triplets() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));
    let seen: Seen = Arc::default();

    mux.enable(ImuChannel::Gyroscope).await.unwrap();
    for ch in ImuChannel::ALL {
        mux.subscribe(ch, recorder(&seen, ch)).await.unwrap();
    }

    assert!(transport.notify(MOVEMENT_DATA, &movement_payload(128, 4096, 100)));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(ImuChannel::Gyroscope, XyzSample { x: 1.0, y: 0.0, z: 0.0 })]
    );

    mux.enable(ImuChannel::Magnetometer).await.unwrap();
    seen.lock().unwrap().clear();
    transport.notify(MOVEMENT_DATA, &movement_payload(-256, 4096, 100));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (ImuChannel::Gyroscope, XyzSample { x: -2.0, y: 0.0, z: 0.0 }),
            (ImuChannel::Magnetometer, XyzSample { x: 100.0 * 4912.0 / 32768.0, y: 0.0, z: 0.0 }),
        ]
    );
}

#[tokio::test]
async fn enabled_but_unsubscribed_channel_is_silent() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));
    let seen: Seen = Arc::default();

    mux.enable(ImuChannel::Gyroscope).await.unwrap();
    mux.enable(ImuChannel::Accelerometer).await.unwrap();
    mux.subscribe(ImuChannel::Accelerometer, recorder(&seen, ImuChannel::Accelerometer))
        .await
        .unwrap();

    transport.notify(MOVEMENT_DATA, &movement_payload(128, -4096, 0));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(ImuChannel::Accelerometer, XyzSample { x: -1.0, y: 0.0, z: 0.0 })]
    );
}

#[tokio::test]
async fn short_notification_is_dropped() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));
    let seen: Seen = Arc::default();

    mux.enable(ImuChannel::Gyroscope).await.unwrap();
    mux.subscribe(ImuChannel::Gyroscope, recorder(&seen, ImuChannel::Gyroscope))
        .await
        .unwrap();

    transport.notify(MOVEMENT_DATA, &[0u8; 17]);
    assert!(seen.lock().unwrap().is_empty());

    // The stream keeps working after a bad payload.
    transport.notify(MOVEMENT_DATA, &movement_payload(128, 0, 0));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn every_enable_writes_full_config_byte() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));

    mux.enable(ImuChannel::Gyroscope).await.unwrap();
    mux.enable(ImuChannel::Magnetometer).await.unwrap();
    mux.enable(ImuChannel::Gyroscope).await.unwrap();

    assert_eq!(transport.writes(MOVEMENT_CONFIG), vec![vec![0x7f]; 3]);
    assert_eq!(mux.enabled_mask().bits(), 0x0047);
}

#[tokio::test]
async fn failed_enable_leaves_mask_unchanged() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));

    mux.enable(ImuChannel::Gyroscope).await.unwrap();
    transport.fail_next_write();
    let err = mux.enable(ImuChannel::Accelerometer).await.unwrap_err();
    assert!(matches!(err, TransportError::Rejected(_)));
    assert_eq!(mux.enabled_mask(), ImuChannel::Gyroscope.mask());
}

#[tokio::test]
async fn disable_powers_down_after_last_channel() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));

    mux.enable(ImuChannel::Gyroscope).await.unwrap();
    mux.enable(ImuChannel::Accelerometer).await.unwrap();
    mux.disable(ImuChannel::Gyroscope).await.unwrap();
    assert_eq!(mux.enabled_mask(), ImuChannel::Accelerometer.mask());
    mux.disable(ImuChannel::Accelerometer).await.unwrap();
    assert!(mux.enabled_mask().is_empty());

    assert_eq!(
        transport.writes(MOVEMENT_CONFIG),
        vec![vec![0x7f], vec![0x7f], vec![0x7f], vec![0x00]]
    );
}

#[tokio::test]
async fn failed_disable_restores_mask() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));

    mux.enable(ImuChannel::Magnetometer).await.unwrap();
    transport.fail_next_write();
    assert!(mux.disable(ImuChannel::Magnetometer).await.is_err());
    assert_eq!(mux.enabled_mask(), ImuChannel::Magnetometer.mask());
}

#[tokio::test]
async fn failed_physical_subscribe_rolls_back() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));

    transport.fail_next_subscribe();
    assert!(mux.subscribe(ImuChannel::Gyroscope, |_: XyzSample| {}).await.is_err());
    assert_eq!(mux.subscriber_count(), 0);
    assert!(!mux.is_subscribed(ImuChannel::Gyroscope));

    // A retry performs the 0 -> 1 transition again.
    mux.subscribe(ImuChannel::Gyroscope, |_: XyzSample| {}).await.unwrap();
    assert_eq!(transport.subscribe_calls(MOVEMENT_DATA), 2);
    assert_eq!(mux.subscriber_count(), 1);
}

#[tokio::test]
async fn failed_physical_unsubscribe_keeps_channel() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));
    let seen: Seen = Arc::default();

    mux.enable(ImuChannel::Gyroscope).await.unwrap();
    mux.subscribe(ImuChannel::Gyroscope, recorder(&seen, ImuChannel::Gyroscope))
        .await
        .unwrap();

    transport.fail_next_unsubscribe();
    assert!(mux.unsubscribe(ImuChannel::Gyroscope).await.is_err());
    assert_eq!(mux.subscriber_count(), 1);
    assert!(mux.is_subscribed(ImuChannel::Gyroscope));

    // The restored callback still receives data.
    transport.notify(MOVEMENT_DATA, &movement_payload(128, 0, 0));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn resubscribe_replaces_callback() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));
    let first: Seen = Arc::default();
    let second: Seen = Arc::default();

    mux.enable(ImuChannel::Accelerometer).await.unwrap();
    mux.subscribe(ImuChannel::Accelerometer, recorder(&first, ImuChannel::Accelerometer))
        .await
        .unwrap();
    mux.subscribe(ImuChannel::Accelerometer, recorder(&second, ImuChannel::Accelerometer))
        .await
        .unwrap();
    assert_eq!(mux.subscriber_count(), 1);
    assert_eq!(transport.subscribe_calls(MOVEMENT_DATA), 1);

    transport.notify(MOVEMENT_DATA, &movement_payload(0, 4096, 0));
    assert!(first.lock().unwrap().is_empty());
    assert_eq!(second.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unsubscribing_inactive_channel_is_a_noop() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));

    mux.unsubscribe(ImuChannel::Magnetometer).await.unwrap();
    assert!(transport.calls().is_empty());

    mux.subscribe(ImuChannel::Gyroscope, |_: XyzSample| {}).await.unwrap();
    mux.unsubscribe(ImuChannel::Magnetometer).await.unwrap();
    assert_eq!(mux.subscriber_count(), 1);
    assert_eq!(transport.calls(), vec![Call::Subscribe(MOVEMENT_DATA)]);
}

#[tokio::test]
async fn shutdown_releases_stream_once_and_resets() {
    let transport = MockTransport::new();
    let mux = ImuMultiplexer::new(Arc::clone(&transport));

    for ch in ImuChannel::ALL {
        mux.enable(ch).await.unwrap();
        mux.subscribe(ch, |_: XyzSample| {}).await.unwrap();
    }
    mux.shutdown().await.unwrap();

    assert_eq!(transport.unsubscribe_calls(MOVEMENT_DATA), 1);
    assert_eq!(mux.subscriber_count(), 0);
    assert!(mux.enabled_mask().is_empty());
    for ch in ImuChannel::ALL {
        assert!(!mux.is_subscribed(ch));
    }

    // Nothing left to release.
    mux.shutdown().await.unwrap();
    assert_eq!(transport.unsubscribe_calls(MOVEMENT_DATA), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribes_issue_one_physical_subscribe() {
    let transport = MockTransport::new();
    let mux = Arc::new(ImuMultiplexer::new(Arc::clone(&transport)));

    let tasks: Vec<_> = ImuChannel::ALL
        .into_iter()
        .map(|ch| {
            let mux = Arc::clone(&mux);
            tokio::spawn(async move { mux.subscribe(ch, |_: XyzSample| {}).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(transport.subscribe_calls(MOVEMENT_DATA), 1);
    assert_eq!(mux.subscriber_count(), 3);

    let tasks: Vec<_> = ImuChannel::ALL
        .into_iter()
        .map(|ch| {
            let mux = Arc::clone(&mux);
            tokio::spawn(async move { mux.unsubscribe(ch).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(transport.unsubscribe_calls(MOVEMENT_DATA), 1);
    assert_eq!(mux.subscriber_count(), 0);
}
