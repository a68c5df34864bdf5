//! Conference node: dispatch engine, receive loop, recorder and player.
//!
//! A [`Node`] joins one multicast conference and runs two kinds of
//! threads: a single receive task that owns the socket and never blocks
//! on user code, and a fixed worker pool that executes registered
//! callbacks. The bounded queue between them sheds on overflow; that
//! queue is the system's one backpressure contract.

pub mod dispatch;
pub mod error;
pub mod node;
pub mod player;
pub mod recorder;

mod receive;
mod registry;

pub use dispatch::{NodeStats, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
pub use error::{NodeError, Result};
pub use node::{Node, NodeConfig};
pub use player::{PlaybackSummary, Player};
pub use recorder::Recorder;
pub use registry::Timestamps;
