//! # Event Bus Delivery Properties
//!
//! Fan-out, fault isolation, deduplicated subscription, unsubscribe and
//! the idle barrier, exercised through the public bus API only.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use shared_bus::events::{EntityExtracted, NarrativeGenerated};
    use shared_bus::{handler_fn, DynHandler, Event, EventBus, EventPublisher, Topic};
    use shared_types::{Entity, LogLevel};

    const DRAIN: Duration = Duration::from_secs(5);

    fn counter(name: &str, count: Arc<AtomicUsize>) -> DynHandler {
        handler_fn(name.to_string(), move |_event| {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn recorder(name: &str, seen: Arc<Mutex<Vec<Arc<Event>>>>) -> DynHandler {
        handler_fn(name.to_string(), move |event| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().push(event);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_fan_out_delivers_same_payload_to_every_handler() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            bus.subscribe(Topic::DataIngested, recorder(&format!("r{i}"), Arc::clone(&seen)));
        }

        let scheduled = bus.publish(Event::data_ingested("d1", "hello")).await;
        assert_eq!(scheduled, 4);
        assert!(bus.wait_until_idle(DRAIN).await);

        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|e| Arc::ptr_eq(e, &seen[0])));
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_siblings() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            Topic::LogsEvent,
            handler_fn("boom", |_event| async { Err(anyhow::anyhow!("boom")) }),
        );
        bus.subscribe(Topic::LogsEvent, counter("counter", Arc::clone(&count)));

        bus.publish(Event::log(LogLevel::Info, "x")).await;
        assert!(bus.wait_until_idle(DRAIN).await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();

        let scheduled = bus
            .publish(Event::NarrativeGenerated(NarrativeGenerated {
                doc_id: "d1".into(),
                narrative: "unheard".into(),
            }))
            .await;
        assert_eq!(scheduled, 0);
        assert_eq!(bus.pending_count(), 0);
        assert!(bus.wait_until_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_same_handler_subscribed_twice_runs_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counter("once", Arc::clone(&count));
        bus.subscribe(Topic::DataIngested, Arc::clone(&handler));
        bus.subscribe(Topic::DataIngested, Arc::clone(&handler));

        for _ in 0..3 {
            bus.publish(Event::data_ingested("d", "x")).await;
        }
        assert!(bus.wait_until_idle(DRAIN).await);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_idle_waits_for_cascaded_handlers() {
        let bus = Arc::new(EventBus::new());
        let first_done = Arc::new(AtomicBool::new(false));
        let second_done = Arc::new(AtomicBool::new(false));

        let (publisher, done) = (Arc::clone(&bus), Arc::clone(&first_done));
        bus.subscribe(
            Topic::DataIngested,
            handler_fn("first", move |event| {
                let (bus, done) = (Arc::clone(&publisher), Arc::clone(&done));
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let doc_id = event.doc_id().unwrap_or_default().to_string();
                    bus.publish(Event::entity_extracted(doc_id, vec![Entity::new("PERSON", "Alice")]))
                        .await;
                    done.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        let done = Arc::clone(&second_done);
        bus.subscribe(
            Topic::EntityExtracted,
            handler_fn("second", move |_event| {
                let done = Arc::clone(&done);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    done.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        bus.publish(Event::data_ingested("d1", "hello")).await;
        assert!(bus.wait_until_idle(DRAIN).await);
        assert!(first_done.load(Ordering::SeqCst));
        assert!(second_done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unsubscribed_handler_never_runs_again() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counter("gone", Arc::clone(&count));
        bus.subscribe(Topic::DataIngested, Arc::clone(&handler));

        bus.publish(Event::data_ingested("d", "x")).await;
        assert!(bus.wait_until_idle(DRAIN).await);
        assert!(bus.unsubscribe(Topic::DataIngested, &handler));

        bus.publish(Event::data_ingested("d", "x")).await;
        assert!(bus.wait_until_idle(DRAIN).await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ingest_to_extraction_chain_records_one_payload() {
        let bus = Arc::new(EventBus::new());
        let recorded: Arc<Mutex<Vec<EntityExtracted>>> = Arc::new(Mutex::new(Vec::new()));

        let publisher = Arc::clone(&bus);
        bus.subscribe(
            Topic::DataIngested,
            handler_fn("extract", move |event| {
                let bus = Arc::clone(&publisher);
                async move {
                    if let Event::DataIngested(ingested) = event.as_ref() {
                        bus.publish(Event::entity_extracted(ingested.doc_id.clone(), Vec::new()))
                            .await;
                    }
                    Ok(())
                }
            }),
        );
        let sink = Arc::clone(&recorded);
        bus.subscribe(
            Topic::EntityExtracted,
            handler_fn("record", move |event| {
                let sink = Arc::clone(&sink);
                async move {
                    if let Event::EntityExtracted(extracted) = event.as_ref() {
                        sink.lock().push(extracted.clone());
                    }
                    Ok(())
                }
            }),
        );

        bus.publish(Event::data_ingested("d1", "hello")).await;
        assert!(bus.wait_until_idle(DRAIN).await);

        let recorded = recorded.lock();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].doc_id, "d1");
    }
}
