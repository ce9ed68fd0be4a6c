//! Multi-topic consumption tests against the in-memory broker.
//!
//! These exercise the coordinator end to end: partition fan-out, per-partition
//! ordering, offset policies, cancellation and first-error shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use protopeek_kafka::{
    Coordinator, DecodeError, Error, MemoryBroker, OffsetPolicy, ProtoDecoder, ProtoParser,
    RecordEvent, ResetTarget,
};
use tokio_util::sync::CancellationToken;

type Delivered = Arc<Mutex<Vec<(String, i32, i64)>>>;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("protopeek_kafka=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Handler recording every event and cancelling after `stop_after` of them.
fn collector(
    delivered: &Delivered,
    cancel: &CancellationToken,
    stop_after: usize,
) -> impl Fn(RecordEvent) -> std::future::Ready<anyhow::Result<()>> + Send + Sync + 'static {
    let delivered = Arc::clone(delivered);
    let cancel = cancel.clone();
    move |event: RecordEvent| {
        let mut delivered = delivered.lock().unwrap();
        delivered.push((event.topic, event.partition, event.offset));
        if delivered.len() >= stop_after {
            cancel.cancel();
        }
        std::future::ready(Ok(()))
    }
}

#[tokio::test]
async fn test_multi_topic_delivery_keeps_partition_order() {
    init_tracing();
    let broker = Arc::new(MemoryBroker::new().with_max_batch(4));
    broker.create_topic("orders", 3);
    broker.create_topic("payments", 2);
    for i in 0..10u8 {
        broker.append("orders", i32::from(i % 3), vec![i]);
        broker.append("payments", i32::from(i % 2), vec![i]);
    }

    let cancel = CancellationToken::new();
    let delivered: Delivered = Arc::default();
    let coordinator = Coordinator::new(broker.clone(), OffsetPolicy::Resume);

    tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.start(
            &cancel,
            &topics(&["orders", "payments"]),
            collector(&delivered, &cancel, 20),
        ),
    )
    .await
    .expect("consumption did not finish")
    .unwrap();

    let delivered = delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 20);

    let mut per_partition: HashMap<(String, i32), Vec<i64>> = HashMap::new();
    for (topic, partition, offset) in delivered {
        per_partition.entry((topic, partition)).or_default().push(offset);
    }
    assert_eq!(per_partition.len(), 5);
    for ((topic, partition), offsets) in &per_partition {
        assert!(
            offsets.windows(2).all(|w| w[0] < w[1]),
            "{topic}/{partition} delivered out of order: {offsets:?}"
        );
        assert_eq!(offsets[0], 0, "{topic}/{partition} did not start at 0");
    }
    assert_eq!(per_partition[&("orders".to_string(), 0)], vec![0, 1, 2, 3]);
    assert_eq!(per_partition[&("payments".to_string(), 1)], vec![0, 1, 2, 3, 4]);

    // Progress is stored per partition
    assert_eq!(broker.stored("orders", 0), Some(4));
    assert_eq!(broker.stored("payments", 1), Some(5));
}

#[tokio::test]
async fn test_offset_policies_pick_the_start() {
    init_tracing();
    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic("t", 1);
    for i in 0..6u8 {
        broker.append("t", 0, vec![i]);
    }
    broker.trim("t", 0, 2);
    broker.set_stored_offset("t", 0, 4);

    let run = |policy: OffsetPolicy, stop_after: usize| {
        let broker = broker.clone();
        async move {
            let cancel = CancellationToken::new();
            let delivered: Delivered = Arc::default();
            Coordinator::new(broker, policy)
                .start(&cancel, &topics(&["t"]), collector(&delivered, &cancel, stop_after))
                .await
                .unwrap();
            let offsets: Vec<i64> = delivered.lock().unwrap().iter().map(|e| e.2).collect();
            offsets
        }
    };

    assert_eq!(run(OffsetPolicy::Resume, 2).await, vec![4, 5]);
    assert_eq!(run(OffsetPolicy::Earliest, 4).await, vec![2, 3, 4, 5]);
    assert_eq!(
        run(OffsetPolicy::Reset(ResetTarget::Earliest), 1).await,
        vec![2]
    );
    // The reset stored the low watermark before consumption moved it on
    assert_eq!(broker.stored("t", 0), Some(3));
}

#[tokio::test]
async fn test_reset_to_latest_only_sees_new_records() {
    init_tracing();
    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic("t", 1);
    for i in 0..5u8 {
        broker.append("t", 0, vec![i]);
    }
    broker.set_stored_offset("t", 0, 2);

    let producer = {
        let broker = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            broker.append("t", 0, b"late".to_vec());
        })
    };

    let cancel = CancellationToken::new();
    let delivered: Delivered = Arc::default();
    Coordinator::new(broker.clone(), OffsetPolicy::Reset(ResetTarget::Latest))
        .start(&cancel, &topics(&["t"]), collector(&delivered, &cancel, 1))
        .await
        .unwrap();
    producer.await.unwrap();

    assert_eq!(
        *delivered.lock().unwrap(),
        vec![("t".to_string(), 0, 5)]
    );
    assert_eq!(broker.stored("t", 0), Some(6));
}

#[tokio::test]
async fn test_cancellation_stops_all_partitions() {
    init_tracing();
    let broker = Arc::new(MemoryBroker::new().with_max_batch(1));
    broker.create_topic("a", 2);
    broker.create_topic("b", 2);
    for i in 0..200u8 {
        broker.append("a", i32::from(i % 2), vec![i]);
        broker.append("b", i32::from(i % 2), vec![i]);
    }

    let count = Arc::new(AtomicUsize::new(0));
    let handler = {
        let count = Arc::clone(&count);
        move |_event: RecordEvent| {
            let count = Arc::clone(&count);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        }
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        trigger.cancel();
    });

    let coordinator = Coordinator::new(broker.clone(), OffsetPolicy::Resume);
    tokio::time::timeout(
        Duration::from_secs(2),
        coordinator.start(&cancel, &topics(&["a", "b"]), handler),
    )
    .await
    .expect("start did not return after cancellation")
    .unwrap();

    let seen = count.load(Ordering::SeqCst);
    assert!(seen > 0);
    assert!(seen < 400);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), seen);
}

#[tokio::test]
async fn test_first_handler_error_stops_every_topic() {
    init_tracing();
    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic("a", 2);
    broker.create_topic("b", 2);
    for partition in 0..2 {
        for i in 0..5u8 {
            broker.append("a", partition, vec![i]);
            broker.append("b", partition, vec![i]);
        }
    }
    // Topic b is slow enough that a fails before b delivers anything
    broker.set_fetch_latency("b", Duration::from_millis(200));

    let a_events = Arc::new(AtomicUsize::new(0));
    let b_events = Arc::new(AtomicUsize::new(0));
    let handler = {
        let a_events = Arc::clone(&a_events);
        let b_events = Arc::clone(&b_events);
        move |event: RecordEvent| {
            let result = if event.topic == "a" {
                a_events.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("boom"))
            } else {
                b_events.fetch_add(1, Ordering::SeqCst);
                Ok(())
            };
            std::future::ready(result)
        }
    };

    let cancel = CancellationToken::new();
    let err = tokio::time::timeout(
        Duration::from_secs(2),
        Coordinator::new(broker.clone(), OffsetPolicy::Resume).start(
            &cancel,
            &topics(&["a", "b"]),
            handler,
        ),
    )
    .await
    .expect("start did not return after the failure")
    .unwrap_err();

    assert!(matches!(&err, Error::Handler(e) if e.to_string() == "boom"));
    assert!(a_events.load(Ordering::SeqCst) >= 1);
    assert_eq!(b_events.load(Ordering::SeqCst), 0);
    // The caller's token is left alone
    assert!(!cancel.is_cancelled());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(b_events.load(Ordering::SeqCst), 0);
    // A failed record is never marked as consumed
    assert_eq!(broker.stored("a", 0), None);
}

#[tokio::test]
async fn test_unknown_topic_fails_before_consuming() {
    init_tracing();
    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic("known", 1);
    broker.append("known", 0, b"x".to_vec());

    let cancel = CancellationToken::new();
    let delivered: Delivered = Arc::default();
    let err = Coordinator::new(broker, OffsetPolicy::Resume)
        .start(
            &cancel,
            &topics(&["known", "missing"]),
            collector(&delivered, &cancel, 1),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownTopic(topic) if topic == "missing"));
    assert!(delivered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_panicking_handler_is_reported() {
    init_tracing();
    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic("t", 1);
    broker.append("t", 0, b"x".to_vec());

    let handler = |_event: RecordEvent| -> std::future::Ready<anyhow::Result<()>> {
        panic!("handler exploded")
    };

    let cancel = CancellationToken::new();
    let err = Coordinator::new(broker, OffsetPolicy::Resume)
        .start(&cancel, &topics(&["t"]), handler)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskFailed(_)));
}

#[tokio::test]
async fn test_truncated_payload_fails_consumption() {
    init_tracing();
    let schema = ProtoParser::from_string(
        r#"
        syntax = "proto3";
        package pkg;
        message Foo { string name = 1; }
        "#,
    )
    .unwrap();
    let decoder = ProtoDecoder::new(Arc::new(schema));

    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic("t1", 1);
    // Field 1, length 5, but only one byte of content
    broker.append("t1", 0, vec![0x0a, 0x05, b'a']);

    let handler = move |event: RecordEvent| {
        let decoder = decoder.clone();
        async move {
            decoder.decode_named("pkg.Foo", &event.value)?;
            Ok::<(), anyhow::Error>(())
        }
    };

    let cancel = CancellationToken::new();
    let err = Coordinator::new(broker, OffsetPolicy::Resume)
        .start(&cancel, &topics(&["t1"]), handler)
        .await
        .unwrap_err();

    let inner = match err {
        Error::Handler(inner) => inner,
        other => panic!("expected a handler error, got {other:?}"),
    };
    let decode = inner
        .downcast_ref::<Error>()
        .expect("handler error should carry the decode error");
    assert!(matches!(
        decode,
        Error::Decode(DecodeError::Truncated { message, .. }) if message == "pkg.Foo"
    ));
}
