//! Container envelope types and the 5-byte wire framing.
//!
//! Every message on a conference travels as a [`Container`] framed with:
//! - A 1-byte marker (`0x0D`)
//! - A 4-byte little-endian word packing the second marker (`0xA4`, low
//!   byte) with a 24-bit payload length (upper bits)
//!
//! The same framing is used on the wire and in flat recording files.

pub mod codec;
pub mod container;
pub mod error;
pub mod reassembler;
pub mod record;

pub use codec::{
    decode_frame, encode_frame, encode_raw_frame, split_frame, HEADER_LEN, MAGIC0, MAGIC1,
    MAX_PAYLOAD_LEN,
};
pub use container::{type_name, Container, TimeStamp, CONTAINER, SHARED_IMAGE};
pub use error::{FrameError, Result};
pub use reassembler::{Reassembler, DEFAULT_RESYNC_WINDOW};
pub use record::{RecordReader, RecordWriter, RecordedFrame};
