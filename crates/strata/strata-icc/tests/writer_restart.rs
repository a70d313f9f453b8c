//! A frame producer that restarts reuses its buffer and id channel. Readers
//! attached to the previous instance must keep receiving from the new one
//! instead of waiting for it to catch up with the old sequence numbers.

use std::time::Duration;

use strata_icc::{
    BroadcastReader, BroadcastWriter, BufferConfig, IdPublisher, IdSubscriber, Publisher, Receiver,
    RingConfig, Sender, Subscriber, channel_path,
};

const TIMEOUT: Duration = Duration::from_millis(200);

fn cfg() -> BufferConfig {
    BufferConfig {
        n_slots: 8,
        meta_bytes: 64,
        data_bytes: 256,
    }
}

#[test]
fn subscriber_follows_restarted_publisher() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("JF07-0.ids");

    let mut publisher = IdPublisher::create(&path, 64).unwrap();
    let mut subscriber = IdSubscriber::open(&path).unwrap();
    for id in 0..50 {
        publisher.publish(id).unwrap();
    }
    let seen: Vec<u64> = std::iter::from_fn(|| subscriber.try_next()).collect();
    assert_eq!(seen.len(), 50);

    drop(publisher);
    let mut publisher = IdPublisher::create(&path, 64).unwrap();
    assert_eq!(publisher.published(), 0);
    assert_eq!(subscriber.try_next(), None);

    publisher.publish(1000).unwrap();
    assert_eq!(subscriber.recv_timeout(TIMEOUT), Some(1000));
    publisher.publish(1001).unwrap();
    assert_eq!(subscriber.try_next(), Some(1001));
    assert_eq!(subscriber.missed(), 0);
}

#[test]
fn reader_remaps_when_restarted_writer_grows_the_ring() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ids");

    let mut writer = BroadcastWriter::<u64>::create(&path, RingConfig::new(4)).unwrap();
    let mut reader = BroadcastReader::<u64>::open(&path).unwrap();
    for id in 0..3 {
        writer.publish(id);
    }
    assert_eq!(reader.try_read(), Some(0));

    drop(writer);
    let mut writer = BroadcastWriter::<u64>::create(&path, RingConfig::new(64)).unwrap();
    for id in 100..120 {
        writer.publish(id);
    }

    let got: Vec<u64> = std::iter::from_fn(|| reader.try_read()).collect();
    assert_eq!(got, (100..120).collect::<Vec<_>>());
    assert_eq!(reader.restarts(), 1);
    assert_eq!(reader.overruns(), 0);
}

#[test]
fn receiver_keeps_reading_after_sender_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mut sender = Sender::create(dir.path(), "JF07-1", cfg(), 16).unwrap();
    let mut receiver = Receiver::open(dir.path(), "JF07-1").unwrap();
    for id in 1..=40 {
        sender.send(id, &[1; 8], &[id as u8; 16]).unwrap();
    }
    while receiver.recv(Duration::ZERO).is_some() {}

    drop(sender);
    let mut sender = Sender::create(dir.path(), "JF07-1", cfg(), 16).unwrap();
    assert!(channel_path(&dir.path().join("JF07-1")).exists());
    sender.send(7, &[2; 8], &[7; 16]).unwrap();

    let frame = receiver.recv(TIMEOUT).unwrap().unwrap();
    assert_eq!(frame.id, 7);
    assert_eq!(frame.data, vec![7; 16]);
}
