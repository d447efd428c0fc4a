//! Binary Frame Protocol
//!
//! Every message on the wire is one frame: a 6-byte bit-packed header
//! followed by the payload.
//!
//! ```text
//! ┌───────┬──────────────────────────┬───────────────────┐
//! │ magic │ type (2b) | len 29..24   │ len 23..0 (BE)    │
//! │ 2 B   │ 1 B                      │ 3 B               │
//! └───────┴──────────────────────────┴───────────────────┘
//! │◄───────────────── header ──────────────────────────►│ payload...
//! ```
//!
//! ## Modules
//!
//! - `frame`: frame/type definitions and the header bit layout
//! - `codec`: async exact-count frame reading and writing
//!
//! ## Example
//!
//! ```
//! use vaultd::protocol::{encode_header, decode_header, FrameType};
//!
//! let header = encode_header(FrameType::Answer, 1024).unwrap();
//! let (frame_type, len) = decode_header(&header).unwrap();
//! assert_eq!((frame_type, len), (FrameType::Answer, 1024));
//! ```

pub mod codec;
pub mod frame;

// Re-export commonly used types for convenience
pub use codec::{read_frame, write_frame, CodecError};
pub use frame::{
    decode_header, declared_len, encode_header, Frame, FrameType, ProtocolError, HEADER_LEN,
    MAGIC, MAX_PAYLOAD_LEN,
};
