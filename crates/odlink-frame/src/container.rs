//! The container envelope and its timestamp pair.
//!
//! Field numbers are an external contract shared with every other
//! conference participant; they must never be renumbered.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Reserved message-type ID of the container envelope itself.
pub const CONTAINER: i32 = 0;

/// Reserved message-type ID of the shared-image descriptor.
pub const SHARED_IMAGE: i32 = 14;

/// Returns a human-readable name for a reserved message-type ID.
pub fn type_name(id: i32) -> &'static str {
    match id {
        CONTAINER => "CONTAINER",
        SHARED_IMAGE => "SHARED_IMAGE",
        _ => "USER",
    }
}

/// A seconds + microseconds wall-clock timestamp.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct TimeStamp {
    #[prost(int32, tag = "1")]
    pub seconds: i32,
    #[prost(int32, tag = "2")]
    pub microseconds: i32,
}

impl TimeStamp {
    /// The current wall-clock time.
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    /// Convert back to a `SystemTime`, saturating at the epoch for
    /// senseless negative values.
    pub fn to_system_time(self) -> SystemTime {
        if self.seconds < 0 || self.microseconds < 0 {
            return UNIX_EPOCH;
        }
        UNIX_EPOCH
            + Duration::from_secs(self.seconds as u64)
            + Duration::from_micros(self.microseconds as u64)
    }
}

impl From<SystemTime> for TimeStamp {
    fn from(t: SystemTime) -> Self {
        let since_epoch = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self {
            seconds: since_epoch.as_secs() as i32,
            microseconds: since_epoch.subsec_micros() as i32,
        }
    }
}

/// The protocol envelope: a type tag, an opaque serialized payload and
/// two timestamps.
///
/// Containers are immutable once constructed and move by value: the
/// receive loop hands each one to exactly one worker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Container {
    /// Message-type ID of the payload schema.
    #[prost(int32, tag = "1")]
    pub data_type: i32,
    /// The serialized payload, decoded only at dispatch time.
    #[prost(bytes = "bytes", tag = "2")]
    pub serialized_data: Bytes,
    /// When the sender published the container.
    #[prost(message, optional, tag = "3")]
    pub sent: Option<TimeStamp>,
    /// When this process received the container.
    #[prost(message, optional, tag = "4")]
    pub received: Option<TimeStamp>,
}

impl Container {
    /// Create a container for publishing, stamped with the current time.
    pub fn new(data_type: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            data_type,
            serialized_data: payload.into(),
            sent: Some(TimeStamp::now()),
            received: None,
        }
    }
}
