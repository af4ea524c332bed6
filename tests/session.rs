//! Session behaviour against an in-memory fixture.
//!
//! Every test runs with tokio's clock paused, so backoff delays and reply
//! timeouts elapse instantly while still being measurable.

mod common;

use std::time::Duration;

use tokio::time::Instant;

use clusterlights::prelude::*;
use clusterlights::protocol::{
    encode_brightness, encode_pattern, encode_power, GET_INFO, GET_STATE, NOTIFY_CHARACTERISTIC,
};

use common::{client, config, info_frame, wait_for_session, Event, FakeFixture};

fn resync() -> Vec<Event> {
    vec![
        Event::Connect,
        Event::Subscribe(NOTIFY_CHARACTERISTIC),
        Event::Write(GET_STATE.to_vec()),
        Event::Write(GET_INFO.to_vec()),
    ]
}

// ----------------------------------------------------------------------------
// Connect and write
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn connect_subscribes_then_resyncs() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    assert_eq!(lights.session_state(), SessionState::Idle);

    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;

    assert_eq!(fixture.events(), resync());
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn second_connect_is_a_no_op() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;

    assert_eq!(fixture.count(&Event::Connect), 1);
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn commands_are_written_in_call_order() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();

    // Queued before the link is up; written once it is.
    lights.on().await.unwrap();
    lights.set_brightness(255).await.unwrap();
    lights.set_wave(true).await.unwrap();
    lights.set_stay_on(true).await.unwrap();

    let writes = fixture.wait_for_writes(6).await;
    assert_eq!(
        writes[2..],
        [
            encode_power(true).to_vec(),
            encode_brightness(255).to_vec(),
            encode_pattern(PatternMask::WAVE).to_vec(),
            encode_pattern(PatternMask::from_bits_truncate(0x41)).to_vec(),
        ]
    );
    assert!(lights.get_on());
    assert_eq!(lights.get_brightness(), 255);
    assert_eq!(lights.get_raw_pattern(), 0x41);
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn commands_fail_when_not_connected() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    assert!(matches!(lights.on().await, Err(Error::NotConnected)));
    assert!(matches!(
        lights.apply_effect(Effect::Wave).await,
        Err(Error::NotConnected)
    ));
    assert!(matches!(lights.get_state().await, Err(Error::NotConnected)));
    // A rejected call leaves the mirror alone.
    assert_eq!(lights.snapshot(), DeviceSnapshot::default());

    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;
    lights.disconnect().await;
    assert!(matches!(
        lights.set_brightness(10).await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn connect_rejects_an_empty_address() {
    let lights = ClusterLights::with_transport(config().with_address(""), FakeFixture::new());
    assert!(matches!(lights.connect(), Err(Error::Config(_))));
    assert_eq!(lights.session_state(), SessionState::Idle);
}

// ----------------------------------------------------------------------------
// Comms loss and reconnection
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn write_failure_reconnects_and_replays_queued_commands() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;

    fixture.fail_next_write();
    lights.on().await.unwrap();
    wait_for_session(&lights, SessionState::CommsLoss).await;
    let lost_at = Instant::now();

    // Accepted while the link is down.
    lights.off().await.unwrap();
    lights.set_brightness(10).await.unwrap();

    wait_for_session(&lights, SessionState::Connected).await;
    assert!(lost_at.elapsed() >= Duration::from_secs(5));
    fixture.wait_for_writes(6).await;

    let mut expected = resync();
    expected.push(Event::WriteFailed(encode_power(true).to_vec()));
    expected.extend(resync());
    expected.push(Event::Write(encode_power(false).to_vec()));
    expected.push(Event::Write(encode_brightness(10).to_vec()));
    assert_eq!(fixture.events(), expected);

    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn closed_notification_stream_is_a_comms_loss() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;

    fixture.drop_link();
    wait_for_session(&lights, SessionState::CommsLoss).await;
    wait_for_session(&lights, SessionState::Connected).await;

    assert_eq!(fixture.count(&Event::Connect), 2);
    assert_eq!(fixture.count(&Event::Disconnect), 0);
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn missing_characteristic_is_retried() {
    let fixture = FakeFixture::new();
    fixture.set_missing_notify(true);
    let lights = client(&fixture);
    lights.connect().unwrap();

    wait_for_session(&lights, SessionState::CommsLoss).await;
    // The half-usable link is closed, not just abandoned.
    assert_eq!(fixture.events(), vec![Event::Connect, Event::Disconnect]);

    fixture.set_missing_notify(false);
    wait_for_session(&lights, SessionState::Connected).await;
    assert_eq!(fixture.count(&Event::Connect), 2);
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn unreachable_fixture_is_retried_until_it_appears() {
    let fixture = FakeFixture::new();
    fixture.set_unreachable(true);
    let lights = ClusterLights::with_transport(
        config().with_resolve_timeout(Duration::from_secs(2)),
        fixture.clone(),
    );
    lights.connect().unwrap();

    wait_for_session(&lights, SessionState::CommsLoss).await;
    lights.on().await.unwrap();
    fixture.set_unreachable(false);

    wait_for_session(&lights, SessionState::Connected).await;
    let writes = fixture.wait_for_writes(3).await;
    assert_eq!(writes[2], encode_power(true).to_vec());
    lights.disconnect().await;
}

// ----------------------------------------------------------------------------
// Disconnect
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_flushes_queue_then_closes_link() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;

    lights.on().await.unwrap();
    lights.off().await.unwrap();
    lights.disconnect().await;

    assert_eq!(lights.session_state(), SessionState::Disconnected);
    let events = fixture.events();
    assert_eq!(
        events[events.len() - 3..],
        [
            Event::Write(encode_power(true).to_vec()),
            Event::Write(encode_power(false).to_vec()),
            Event::Disconnect,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_backoff_skips_the_link() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;

    fixture.fail_next_write();
    lights.on().await.unwrap();
    wait_for_session(&lights, SessionState::CommsLoss).await;

    let started = Instant::now();
    lights.disconnect().await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(lights.session_state(), SessionState::Disconnected);
    assert_eq!(fixture.count(&Event::Disconnect), 0);
    assert_eq!(fixture.count(&Event::Connect), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_interrupts_address_resolution() {
    let fixture = FakeFixture::new();
    fixture.set_unreachable(true);
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connecting).await;

    let started = Instant::now();
    lights.disconnect().await;

    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(lights.session_state(), SessionState::Disconnected);
    assert!(fixture.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_link_setup_closes_the_link() {
    let fixture = FakeFixture::new();
    fixture.set_subscribe_delay(Duration::from_secs(10));
    let lights = client(&fixture);
    lights.connect().unwrap();
    fixture
        .wait_for_event(&Event::Subscribe(NOTIFY_CHARACTERISTIC))
        .await;
    assert_eq!(lights.session_state(), SessionState::Connecting);

    let started = Instant::now();
    lights.disconnect().await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(lights.session_state(), SessionState::Disconnected);
    assert_eq!(
        fixture.events(),
        vec![
            Event::Connect,
            Event::Subscribe(NOTIFY_CHARACTERISTIC),
            Event::Disconnect,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_after_enqueue_timeout() {
    let fixture = FakeFixture::new();
    fixture.set_unreachable(true);
    let lights =
        ClusterLights::with_transport(config().with_queue_capacity(2), fixture.clone());
    lights.connect().unwrap();

    lights.on().await.unwrap();
    lights.off().await.unwrap();

    let started = Instant::now();
    let err = lights.set_brightness(50).await.unwrap_err();
    assert!(matches!(err, Error::QueueFull { capacity: 2 }));
    assert!(started.elapsed() >= Duration::from_secs(1));

    lights.disconnect().await;
    assert_eq!(lights.session_state(), SessionState::Disconnected);
}

// ----------------------------------------------------------------------------
// Queries
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn get_state_without_reply_returns_after_reply_timeout() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;

    let before = lights.snapshot();
    let started = Instant::now();
    lights.get_state().await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1100));
    assert_eq!(lights.snapshot(), before);
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn get_state_reply_updates_power() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;
    assert!(!lights.get_on());

    fixture.reply_to_state(vec![0x00, 0x00, 0x00, 0x01, 0x00]);
    let started = Instant::now();
    lights.get_state().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(lights.get_on());
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn get_information_reply_updates_brightness_and_pattern() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;

    fixture.reply_to_info(info_frame(50, 0x11));
    let started = Instant::now();
    lights.get_information().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(lights.get_brightness(), 129);
    assert!(lights.get_wave());
    assert!(lights.get_fade_away());
    assert!(!lights.get_stay_on());
    assert_eq!(lights.current_effect(), Effect::Wave);
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn resync_replies_refresh_state_on_connect() {
    let fixture = FakeFixture::new();
    fixture.reply_to_state(vec![0x00, 0x00, 0x00, 0x01]);
    fixture.reply_to_info(info_frame(99, 0x40));
    let lights = client(&fixture);
    lights.connect().unwrap();
    wait_for_session(&lights, SessionState::Connected).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        lights.snapshot(),
        DeviceSnapshot {
            power: true,
            brightness: 255,
            pattern: PatternMask::STAY_ON,
        }
    );
    lights.disconnect().await;
}

// ----------------------------------------------------------------------------
// Patterns and effects
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reset_pattern_then_set_sends_only_new_bits() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();

    lights.set_wave(true).await.unwrap();
    lights.set_phase(true).await.unwrap();
    lights.reset_pattern();
    lights.set_fast_twinkle(true).await.unwrap();
    lights.set_phase(false).await.unwrap();

    let writes = fixture.wait_for_writes(6).await;
    let masks: Vec<u8> = writes[2..].iter().map(|w| w[4]).collect();
    assert_eq!(masks, [0x01, 0x03, 0x20, 0x20]);
    lights.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn apply_effect_selects_a_single_pattern() {
    let fixture = FakeFixture::new();
    let lights = client(&fixture);
    lights.connect().unwrap();

    lights.set_wave(true).await.unwrap();
    lights.set_stay_on(true).await.unwrap();
    lights.apply_effect(Effect::FadeAway).await.unwrap();

    let writes = fixture.wait_for_writes(5).await;
    assert_eq!(writes[4], encode_pattern(PatternMask::FADE_AWAY).to_vec());
    assert_eq!(lights.current_effect(), Effect::FadeAway);
    assert!(!lights.get_wave());
    lights.disconnect().await;
}
