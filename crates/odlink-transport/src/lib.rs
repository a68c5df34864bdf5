//! UDP multicast conference socket.
//!
//! A conference is one communication domain, selected by a small
//! conference ID (0-255) that becomes the last octet of a fixed private
//! multicast prefix. This is the lowest layer of odlink; the receive
//! loop and publish path both go through the [`Conference`] type here.

pub mod conference;
pub mod error;

pub use conference::{group_for_cid, Conference, DEFAULT_PORT, MAX_DATAGRAM, MULTICAST_PREFIX};
pub use error::{Result, TransportError};
