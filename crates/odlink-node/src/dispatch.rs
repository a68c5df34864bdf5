use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use odlink_frame::{Container, SHARED_IMAGE};
use odlink_media::{MediaChannel, SharedImage};
use prost::Message;
use tracing::{debug, warn};

use crate::error::{NodeError, Result};
use crate::registry::{CallbackRegistry, Timestamps, TypedOutcome};

/// Default dispatch queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 4;

/// Monotonic counters for diagnostics.
#[derive(Default)]
pub(crate) struct Counters {
    pub received: AtomicU64,
    pub queued: AtomicU64,
    pub dropped: AtomicU64,
    pub decode_errors: AtomicU64,
    pub callback_panics: AtomicU64,
}

/// A point-in-time snapshot of the node's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Containers handed to the engine by the receive path.
    pub received: u64,
    /// Containers accepted into the dispatch queue.
    pub queued: u64,
    /// Containers shed because the queue was full.
    pub dropped: u64,
    /// Payloads a registered decoder rejected.
    pub decode_errors: u64,
    /// User callbacks that panicked (contained, worker survived).
    pub callback_panics: u64,
}

/// Decouples reception from user callback execution.
///
/// A bounded FIFO queue sits between the receive task and a fixed pool
/// of workers; when the queue is full the container is shed so the
/// receive path never blocks on user code. This queue is the only
/// synchronized hand-off in the system.
pub struct DispatchEngine {
    registry: CallbackRegistry,
    media: Box<dyn MediaChannel>,
    tx: Mutex<Option<Sender<Container>>>,
    rx: Receiver<Container>,
    known_ids: Mutex<BTreeSet<i32>>,
    counters: Counters,
}

impl DispatchEngine {
    pub(crate) fn new(capacity: usize, media: Box<dyn MediaChannel>) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            registry: CallbackRegistry::default(),
            media,
            tx: Mutex::new(Some(tx)),
            rx,
            known_ids: Mutex::new(BTreeSet::new()),
            counters: Counters::default(),
        }
    }

    /// Register a typed handler for one message type; replaces any
    /// previous registration for the same ID.
    pub fn register<M, F>(&self, id: i32, handler: F)
    where
        M: Message + Default,
        F: Fn(M, Timestamps) + Send + Sync + 'static,
    {
        self.registry.register(id, handler);
    }

    /// Register a raw callback invoked with every container.
    pub fn register_container<F>(&self, handler: F)
    where
        F: Fn(&Container) + Send + Sync + 'static,
    {
        self.registry.register_raw(handler);
    }

    /// Register an image handler for one media channel name.
    pub fn register_image<F>(&self, name: &str, handler: F)
    where
        F: Fn(odlink_media::PixelBuffer, Timestamps) + Send + Sync + 'static,
    {
        self.registry.register_image(name, handler);
    }

    /// Offer a container to the dispatch queue.
    ///
    /// Shedding, never blocking: a full queue drops the container and
    /// reports `QueueFull`. The known-ID set is updated either way.
    pub fn enqueue(&self, container: Container) -> Result<()> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let id = container.data_type;

        let first_sighting = self
            .known_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
        if first_sighting && id != SHARED_IMAGE && !self.registry.has_typed(id) {
            debug!(id, "observed message type with no registered decoder");
        }

        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(NodeError::ShutDown);
        };
        match tx.try_send(container) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    id,
                    "dispatch queue full, dropping container; slow callbacks or send rate too high"
                );
                Err(NodeError::QueueFull { id })
            }
            Err(TrySendError::Disconnected(_)) => Err(NodeError::ShutDown),
        }
    }

    /// Every message-type ID observed on the wire since startup,
    /// ascending. The set never shrinks.
    pub fn known_type_ids(&self) -> Vec<i32> {
        self.known_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    /// Snapshot the diagnostic counters.
    pub fn stats(&self) -> NodeStats {
        NodeStats {
            received: self.counters.received.load(Ordering::Relaxed),
            queued: self.counters.queued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
            callback_panics: self.counters.callback_panics.load(Ordering::Relaxed),
        }
    }

    /// Hand a worker its end of the queue.
    pub(crate) fn worker_receiver(&self) -> Receiver<Container> {
        self.rx.clone()
    }

    /// Stop accepting containers; workers drain what is already queued
    /// and then exit.
    pub(crate) fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Process one dequeued container: raw callbacks, typed dispatch,
    /// shared-image dispatch. Failures and panics are contained per
    /// container.
    pub(crate) fn handle(&self, container: &Container) {
        let panics = self.registry.invoke_raw(container);
        if panics > 0 {
            self.counters
                .callback_panics
                .fetch_add(panics, Ordering::Relaxed);
        }

        match self.registry.invoke_typed(container) {
            TypedOutcome::Unregistered | TypedOutcome::Delivered => {}
            TypedOutcome::DecodeFailed(err) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(id = container.data_type, error = %err, "typed dispatch failed");
            }
            TypedOutcome::Panicked => {
                self.counters
                    .callback_panics
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        if container.data_type == SHARED_IMAGE {
            if let Err(err) = self.dispatch_image(container) {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "shared-image dispatch failed");
            }
        }
    }

    fn dispatch_image(&self, container: &Container) -> Result<()> {
        let descriptor = SharedImage::decode(container.serialized_data.clone())
            .map_err(odlink_media::MediaError::from)?;
        if !self.registry.has_image(&descriptor.name) {
            return Ok(());
        }

        let pixels = self.media.fetch(&descriptor)?;
        if !self
            .registry
            .invoke_image(&descriptor.name, pixels, Timestamps::of(container))
        {
            self.counters
                .callback_panics
                .fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Worker loop body: dequeue until the queue is closed and drained.
pub(crate) fn run_worker(engine: &DispatchEngine, rx: Receiver<Container>) {
    while let Ok(container) = rx.recv() {
        engine.handle(&container);
    }
    debug!("dispatch worker exiting");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use odlink_media::{MediaError, PixelBuffer};

    use super::*;

    #[derive(Clone, PartialEq, ::prost::Message)]
    struct Reading {
        #[prost(uint32, tag = "1")]
        value: u32,
    }

    /// Serves pixel buffers straight from the descriptor, no shared
    /// memory involved; counts fetches.
    struct MockMedia {
        fetches: AtomicUsize,
        fill: u8,
    }

    impl MockMedia {
        fn new(fill: u8) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fill,
            }
        }
    }

    impl MediaChannel for MockMedia {
        fn fetch(&self, descriptor: &SharedImage) -> odlink_media::Result<PixelBuffer> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let len =
                descriptor.width as usize * descriptor.height as usize
                    * descriptor.bytes_per_pixel as usize;
            PixelBuffer::new(
                descriptor.width,
                descriptor.height,
                descriptor.bytes_per_pixel,
                Bytes::from(vec![self.fill; len]),
            )
        }
    }

    /// Always fails after being called; simulates a missing producer.
    struct FailingMedia;

    impl MediaChannel for FailingMedia {
        fn fetch(&self, _descriptor: &SharedImage) -> odlink_media::Result<PixelBuffer> {
            Err(MediaError::Segment {
                key: 0,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    fn engine(capacity: usize) -> DispatchEngine {
        DispatchEngine::new(capacity, Box::new(MockMedia::new(0)))
    }

    fn container(id: i32, payload: impl Into<Bytes>) -> Container {
        Container::new(id, payload)
    }

    fn reading_container(id: i32, value: u32) -> Container {
        container(id, Reading { value }.encode_to_vec())
    }

    #[test]
    fn eleventh_container_is_shed_and_fifo_preserved() {
        let engine = engine(DEFAULT_QUEUE_CAPACITY);

        for i in 0..10 {
            engine.enqueue(reading_container(i, i as u32)).unwrap();
        }
        let err = engine.enqueue(reading_container(10, 10)).unwrap_err();
        assert!(matches!(err, NodeError::QueueFull { id: 10 }));

        let stats = engine.stats();
        assert_eq!(stats.received, 11);
        assert_eq!(stats.queued, 10);
        assert_eq!(stats.dropped, 1);

        let rx = engine.worker_receiver();
        for expected in 0..10 {
            assert_eq!(rx.try_recv().unwrap().data_type, expected);
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn typed_dispatch_hits_registered_id_only() {
        let engine = engine(4);
        let seen: Arc<Mutex<Vec<(u32, Timestamps)>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        engine.register(5, move |reading: Reading, stamps| {
            sink.lock().unwrap().push((reading.value, stamps));
        });

        engine.handle(&reading_container(5, 42));
        engine.handle(&reading_container(6, 99));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 42);
        assert!(seen[0].1.sent > std::time::SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn reregistration_replaces_the_handler() {
        let engine = engine(4);
        let counter = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&counter);
        engine.register(5, move |_: Reading, _| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = Arc::clone(&counter);
        engine.register(5, move |_: Reading, _| {
            second.fetch_add(100, Ordering::SeqCst);
        });

        engine.handle(&reading_container(5, 1));
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn known_ids_accumulate_without_duplicates() {
        let engine = engine(16);
        for id in [3, 3, 7, 3, 9] {
            let _ = engine.enqueue(reading_container(id, 0));
        }
        assert_eq!(engine.known_type_ids(), vec![3, 7, 9]);
    }

    #[test]
    fn decode_mismatch_is_counted_and_contained() {
        let engine = engine(4);
        let delivered = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&delivered);
        engine.register(5, move |_: Reading, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        // Field 1, wire type 7: not a valid Reading.
        engine.handle(&container(5, Bytes::from_static(&[0x0F, 0xFF])));
        assert_eq!(engine.stats().decode_errors, 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        // The engine keeps dispatching afterwards.
        engine.handle(&reading_container(5, 7));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_panics_are_contained() {
        let engine = engine(4);
        let raw_calls = Arc::new(AtomicUsize::new(0));

        engine.register_container(|_| panic!("user bug"));
        let sink = Arc::clone(&raw_calls);
        engine.register_container(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        engine.register(5, |_: Reading, _| panic!("another user bug"));

        engine.handle(&reading_container(5, 1));
        engine.handle(&reading_container(5, 2));

        // Both panicking callbacks fired both times, the well-behaved
        // raw callback was never starved.
        assert_eq!(engine.stats().callback_panics, 4);
        assert_eq!(raw_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn callbacks_may_register_further_handlers() {
        let engine = Arc::new(engine(4));
        let delivered = Arc::new(AtomicUsize::new(0));

        // Registering from inside a running callback hits the same
        // registry the dispatcher is reading from; it must not block.
        let inner = Arc::clone(&engine);
        let sink = Arc::clone(&delivered);
        engine.register_container(move |container| {
            if container.data_type == 1 {
                inner.register_container(|_| {});
                let sink = Arc::clone(&sink);
                inner.register(2, move |_: Reading, _| {
                    sink.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        engine.handle(&reading_container(1, 0));
        engine.handle(&reading_container(2, 0));

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    fn shared_image_container(name: &str, w: u32, h: u32, bpp: u32) -> Container {
        let descriptor = SharedImage {
            name: name.to_string(),
            width: w,
            height: h,
            bytes_per_pixel: bpp,
            size: w * h * bpp,
        };
        container(SHARED_IMAGE, descriptor.encode_to_vec())
    }

    #[test]
    fn shared_image_reaches_the_registered_handler() {
        let media = Box::new(MockMedia::new(0xAB));
        let engine = DispatchEngine::new(4, media);
        let pixels_seen = Arc::new(Mutex::new(Vec::<u8>::new()));

        let sink = Arc::clone(&pixels_seen);
        engine.register_image("cam0", move |pixels, _stamps| {
            sink.lock().unwrap().extend_from_slice(pixels.data());
        });

        engine.handle(&shared_image_container("cam0", 2, 2, 1));
        assert_eq!(pixels_seen.lock().unwrap().as_slice(), &[0xAB; 4]);
    }

    #[test]
    fn unregistered_image_channel_skips_the_fetch() {
        let media = Box::new(MockMedia::new(0));
        let engine = DispatchEngine::new(4, media);

        engine.register_image("cam0", |_, _| {});
        engine.handle(&shared_image_container("cam1", 2, 2, 1));

        // Reaching into the engine-owned mock through the trait object
        // is not possible; a failed fetch would have been counted.
        assert_eq!(engine.stats().decode_errors, 0);
    }

    #[test]
    fn failed_media_fetch_is_reported_not_fatal() {
        let engine = DispatchEngine::new(4, Box::new(FailingMedia));
        let called = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&called);
        engine.register_image("cam0", move |_, _| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        engine.handle(&shared_image_container("cam0", 2, 2, 1));
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(engine.stats().decode_errors, 1);
    }

    #[test]
    fn workers_drain_the_queue_after_close() {
        let engine = Arc::new(engine(8));
        let handled = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&handled);
        engine.register_container(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        for i in 0..5 {
            engine.enqueue(reading_container(i, 0)).unwrap();
        }
        engine.close();
        assert!(matches!(
            engine.enqueue(reading_container(9, 0)).unwrap_err(),
            NodeError::ShutDown
        ));

        let worker = {
            let engine = Arc::clone(&engine);
            let rx = engine.worker_receiver();
            std::thread::spawn(move || run_worker(&engine, rx))
        };
        worker.join().unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 5);
    }
}
