use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;
use odlink_frame::{encode_frame, encode_raw_frame, Container, DEFAULT_RESYNC_WINDOW};
use odlink_media::{MediaChannel, SysvMediaChannel};
use odlink_transport::{Conference, DEFAULT_PORT};
use prost::Message;
use tracing::{error, info};

use crate::dispatch::{DispatchEngine, NodeStats, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::error::{NodeError, Result};
use crate::receive::run_receive_loop;
use crate::registry::Timestamps;

/// Tunables for a conference node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Conference ID, the last octet of the multicast group.
    pub cid: u8,
    /// Conference UDP port.
    pub port: u16,
    /// Local interface to join on; unspecified means system default.
    pub interface: Ipv4Addr,
    /// Dispatch queue capacity; a full queue sheds containers.
    pub queue_capacity: usize,
    /// Worker pool size.
    pub workers: usize,
    /// Receive read timeout; bounds shutdown latency.
    pub read_timeout: Duration,
    /// Maximum garbage bytes dropped per resynchronization.
    pub resync_window: usize,
}

impl NodeConfig {
    /// Defaults for a conference ID.
    pub fn new(cid: u8) -> Self {
        Self {
            cid,
            ..Self::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cid: 0,
            port: DEFAULT_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            read_timeout: Duration::from_millis(100),
            resync_window: DEFAULT_RESYNC_WINDOW,
        }
    }
}

/// A publish/subscribe client on one conference.
///
/// Owns the conference socket, the dispatch engine and, once started,
/// one receive thread plus a fixed worker pool. Registration is
/// synchronized with dispatch, so callbacks may be added before or
/// after `start`; registering everything first avoids missing early
/// traffic.
pub struct Node {
    conference: Conference,
    engine: Arc<DispatchEngine>,
    config: NodeConfig,
    running: Arc<AtomicBool>,
    receive: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Node {
    /// Join a conference with default configuration.
    pub fn open(cid: u8) -> Result<Self> {
        Self::with_config(NodeConfig::new(cid))
    }

    /// Join a conference with explicit configuration and the real
    /// shared-memory media channel.
    pub fn with_config(config: NodeConfig) -> Result<Self> {
        Self::with_media_channel(config, Box::new(SysvMediaChannel))
    }

    /// Join a conference with a caller-supplied media channel.
    pub fn with_media_channel(config: NodeConfig, media: Box<dyn MediaChannel>) -> Result<Self> {
        let conference = Conference::open_on(config.cid, config.port, config.interface)?;
        let engine = Arc::new(DispatchEngine::new(config.queue_capacity, media));
        Ok(Self {
            conference,
            engine,
            config,
            running: Arc::new(AtomicBool::new(false)),
            receive: None,
            workers: Vec::new(),
        })
    }

    /// Register a typed handler for one message type. The payload
    /// decoder is fixed by `M`; re-registering an ID replaces the
    /// previous handler.
    pub fn register<M, F>(&self, id: i32, handler: F)
    where
        M: Message + Default,
        F: Fn(M, Timestamps) + Send + Sync + 'static,
    {
        self.engine.register(id, handler);
    }

    /// Register a raw callback invoked with every container, undecoded.
    pub fn register_container<F>(&self, handler: F)
    where
        F: Fn(&Container) + Send + Sync + 'static,
    {
        self.engine.register_container(handler);
    }

    /// Register an image handler for one media channel name, invoked
    /// with the fetched pixel buffer for matching shared-image
    /// containers.
    pub fn register_image<F>(&self, name: &str, handler: F)
    where
        F: Fn(odlink_media::PixelBuffer, Timestamps) + Send + Sync + 'static,
    {
        self.engine.register_image(name, handler);
    }

    /// Spawn the receive thread and the worker pool.
    pub fn start(&mut self) -> Result<()> {
        if self.receive.is_some() {
            return Err(NodeError::AlreadyStarted);
        }

        self.running.store(true, Ordering::SeqCst);

        for i in 0..self.config.workers {
            let engine = Arc::clone(&self.engine);
            let rx = self.engine.worker_receiver();
            let handle = std::thread::Builder::new()
                .name(format!("odlink-worker-{i}"))
                .spawn(move || crate::dispatch::run_worker(&engine, rx))?;
            self.workers.push(handle);
        }

        let socket = self.conference.try_clone()?;
        socket.set_read_timeout(Some(self.config.read_timeout))?;
        let engine = Arc::clone(&self.engine);
        let running = Arc::clone(&self.running);
        let resync_window = self.config.resync_window;
        let handle = std::thread::Builder::new()
            .name("odlink-recv".to_string())
            .spawn(move || run_receive_loop(socket, engine, running, resync_window))?;
        self.receive = Some(handle);

        info!(
            cid = self.config.cid,
            workers = self.config.workers,
            "node started"
        );
        Ok(())
    }

    /// Serialize a message and publish it as a container of type `id`.
    pub fn publish<M: Message>(&self, id: i32, message: &M) -> Result<()> {
        self.publish_container(&Container::new(id, message.encode_to_vec()))
    }

    /// Publish a prepared container.
    pub fn publish_container(&self, container: &Container) -> Result<()> {
        let mut wire = BytesMut::new();
        encode_frame(container, &mut wire)?;
        self.conference.send(&wire)?;
        Ok(())
    }

    /// Frame and publish already-serialized container bytes verbatim.
    pub fn publish_raw(&self, payload: &[u8]) -> Result<()> {
        let mut wire = BytesMut::new();
        encode_raw_frame(payload, &mut wire)?;
        self.conference.send(&wire)?;
        Ok(())
    }

    /// Every message-type ID observed since startup, ascending.
    pub fn known_type_ids(&self) -> Vec<i32> {
        self.engine.known_type_ids()
    }

    /// Snapshot the node's diagnostic counters.
    pub fn stats(&self) -> NodeStats {
        self.engine.stats()
    }

    /// Stop receiving, drain the queue, and join every thread.
    ///
    /// Ordering: the receive thread stops first so nothing new is
    /// enqueued, then the queue is closed and the workers finish
    /// whatever is already buffered.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop();
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.receive.take() {
            if handle.join().is_err() {
                error!("receive thread panicked");
            }
        }
        self.engine.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("dispatch worker panicked");
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}
