use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use odlink_frame::Container;
use odlink_media::PixelBuffer;
use prost::Message;
use tracing::warn;

use crate::error::NodeError;

/// The sent/received pair of a dispatched container, reconstructed as
/// wall-clock times. Missing stamps saturate at the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub sent: SystemTime,
    pub received: SystemTime,
}

impl Timestamps {
    pub(crate) fn of(container: &Container) -> Self {
        Self {
            sent: container
                .sent
                .map_or(SystemTime::UNIX_EPOCH, |t| t.to_system_time()),
            received: container
                .received
                .map_or(SystemTime::UNIX_EPOCH, |t| t.to_system_time()),
        }
    }
}

/// Decoder and handler for one message type, fused into a single
/// type-erased closure at registration time. Entries are shared so
/// dispatch can clone them out of the lock before invoking.
type TypedEntry = Arc<dyn Fn(&Container) -> Result<(), NodeError> + Send + Sync>;
type RawEntry = Arc<dyn Fn(&Container) + Send + Sync>;
type ImageEntry = Arc<dyn Fn(PixelBuffer, Timestamps) + Send + Sync>;

/// Outcome of a typed dispatch attempt.
pub(crate) enum TypedOutcome {
    /// No handler registered for this message type.
    Unregistered,
    /// Handler ran to completion.
    Delivered,
    /// Registered decoder rejected the payload; handler not invoked.
    DecodeFailed(NodeError),
    /// Handler panicked; the panic was contained.
    Panicked,
}

/// The three callback maps, owned by the dispatch engine and read by
/// all workers concurrently. Registration is synchronized with
/// dispatch, so registering after start is allowed; no lock is held
/// while a callback runs, so callbacks may register further handlers.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    typed: RwLock<HashMap<i32, TypedEntry>>,
    raw: RwLock<Vec<RawEntry>>,
    image: RwLock<HashMap<String, ImageEntry>>,
}

impl CallbackRegistry {
    /// Register a typed handler. The decoder is fixed by the generic
    /// bound here, not discovered at dispatch time; registering the
    /// same ID again replaces the previous entry.
    pub(crate) fn register<M, F>(&self, id: i32, handler: F)
    where
        M: Message + Default,
        F: Fn(M, Timestamps) + Send + Sync + 'static,
    {
        let entry: TypedEntry = Arc::new(move |container| {
            let message = M::decode(container.serialized_data.clone())
                .map_err(|_| NodeError::DecodeMismatch {
                    id: container.data_type,
                })?;
            handler(message, Timestamps::of(container));
            Ok(())
        });
        self.typed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, entry);
    }

    /// Register a raw callback invoked with every container, undecoded.
    pub(crate) fn register_raw<F>(&self, handler: F)
    where
        F: Fn(&Container) + Send + Sync + 'static,
    {
        self.raw
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(handler));
    }

    /// Register an image handler for one media channel name.
    pub(crate) fn register_image<F>(&self, name: &str, handler: F)
    where
        F: Fn(PixelBuffer, Timestamps) + Send + Sync + 'static,
    {
        self.image
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::new(handler));
    }

    pub(crate) fn has_typed(&self, id: i32) -> bool {
        self.typed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    pub(crate) fn has_image(&self, name: &str) -> bool {
        self.image
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Run every raw callback; returns how many of them panicked.
    pub(crate) fn invoke_raw(&self, container: &Container) -> u64 {
        let raw: Vec<RawEntry> = self
            .raw
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut panics = 0;
        for callback in raw.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(container))).is_err() {
                warn!(id = container.data_type, "raw container callback panicked");
                panics += 1;
            }
        }
        panics
    }

    /// Decode and deliver to the typed handler for this container's ID.
    pub(crate) fn invoke_typed(&self, container: &Container) -> TypedOutcome {
        let entry = self
            .typed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&container.data_type)
            .cloned();
        let Some(entry) = entry else {
            return TypedOutcome::Unregistered;
        };
        match catch_unwind(AssertUnwindSafe(|| entry(container))) {
            Ok(Ok(())) => TypedOutcome::Delivered,
            Ok(Err(err)) => TypedOutcome::DecodeFailed(err),
            Err(_) => {
                warn!(id = container.data_type, "typed callback panicked");
                TypedOutcome::Panicked
            }
        }
    }

    /// Deliver a fetched pixel buffer; returns false if the handler
    /// panicked.
    pub(crate) fn invoke_image(
        &self,
        name: &str,
        pixels: PixelBuffer,
        stamps: Timestamps,
    ) -> bool {
        let entry = self
            .image
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned();
        let Some(entry) = entry else {
            return true;
        };
        if catch_unwind(AssertUnwindSafe(|| entry(pixels, stamps))).is_err() {
            warn!(channel = name, "image callback panicked");
            return false;
        }
        true
    }
}
