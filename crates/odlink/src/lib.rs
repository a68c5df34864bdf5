//! Publish/subscribe client for OpenDaVINCI-style container conferences.
//!
//! odlink speaks the container conference wire protocol: length-prefixed
//! protobuf containers exchanged over a UDP multicast group, with a
//! shared-memory side channel for large image payloads.
//!
//! # Crate Structure
//!
//! - [`frame`]: container encoding, frame reassembly and recording files
//! - [`transport`]: multicast conference sockets
//! - [`media`]: shared-memory media channel for image payloads
//! - [`node`]: the conference node, dispatch engine, recorder and player

/// Re-export frame types.
pub mod frame {
    pub use odlink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use odlink_transport::*;
}

/// Re-export media channel types.
pub mod media {
    pub use odlink_media::*;
}

/// Re-export node types.
pub mod node {
    pub use odlink_node::*;
}
