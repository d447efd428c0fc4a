//! Wire Frame Types and Header Codec
//!
//! This module defines the frame types used on the wire and the 6-byte
//! header that prefixes every frame.
//!
//! ## Wire Format
//!
//! Every frame is a 6-byte header followed by the payload:
//!
//! ```text
//! byte 0..2   magic constant "VD"
//! byte 2      bits 7..6: frame type id (0-3)
//!             bits 5..0: bits 29..24 of the payload length
//! byte 3..6   bits 23..0 of the payload length, big-endian
//! ```
//!
//! The payload length therefore fits in 30 bits (just under 1 GiB), and
//! the frame type in 2 bits.
//!
//! ## Frame Types
//!
//! - `SingleCommand` (0): one dash-delimited text command
//! - `CompoundCommand` (1): `;`-separated batch of commands
//! - `FileTransfer` (2): raw file bytes
//! - `Answer` (3): the server's textual reply
//! - `Invalid`: local-only sentinel for frames that fail magic
//!   verification; it is never transmitted.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// The 2-byte magic constant opening every frame header.
pub const MAGIC: [u8; 2] = *b"VD";

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 6;

/// Maximum payload length: the header carries a 30-bit length field.
pub const MAX_PAYLOAD_LEN: usize = (1 << 30) - 1;

/// Errors produced while encoding or decoding frame headers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The first two header bytes do not match the magic constant.
    #[error("bad magic: {0:#04x} {1:#04x}")]
    BadMagic(u8, u8),

    /// The payload does not fit in the 30-bit length field.
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// The four transmissible frame types plus the local `Invalid` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// A single dash-delimited command string.
    SingleCommand,
    /// A `;`-separated batch of command strings.
    CompoundCommand,
    /// Raw file bytes.
    FileTransfer,
    /// A textual reply from the server.
    Answer,
    /// Magic verification failed; never put on the wire.
    Invalid,
}

impl FrameType {
    /// The 2-bit wire id of this frame type.
    ///
    /// `Invalid` has no wire representation; asking for its id is a
    /// programming error and only reachable from encode paths that
    /// refuse `Invalid` frames up front.
    pub fn id(self) -> u8 {
        match self {
            FrameType::SingleCommand => 0,
            FrameType::CompoundCommand => 1,
            FrameType::FileTransfer => 2,
            FrameType::Answer => 3,
            FrameType::Invalid => unreachable!("Invalid frames are never encoded"),
        }
    }

    /// Maps a 2-bit wire id back to a frame type. Total over 0..=3.
    pub fn from_id(id: u8) -> Self {
        match id & 0x03 {
            0 => FrameType::SingleCommand,
            1 => FrameType::CompoundCommand,
            2 => FrameType::FileTransfer,
            _ => FrameType::Answer,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrameType::SingleCommand => "single-command",
            FrameType::CompoundCommand => "compound-command",
            FrameType::FileTransfer => "file-transfer",
            FrameType::Answer => "answer",
            FrameType::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// One complete protocol message: a frame type plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    /// Creates a frame of the given type.
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    /// An answer frame carrying a UTF-8 message.
    pub fn answer(message: impl Into<String>) -> Self {
        Self::new(FrameType::Answer, Bytes::from(message.into()))
    }

    /// A single-command frame carrying a command string.
    pub fn command(command: impl Into<String>) -> Self {
        Self::new(FrameType::SingleCommand, Bytes::from(command.into()))
    }

    /// A compound-command frame carrying a `;`-separated batch.
    pub fn compound(batch: impl Into<String>) -> Self {
        Self::new(FrameType::CompoundCommand, Bytes::from(batch.into()))
    }

    /// A file-transfer frame carrying raw bytes.
    pub fn file(data: impl Into<Bytes>) -> Self {
        Self::new(FrameType::FileTransfer, data)
    }

    /// The local sentinel for a frame that failed magic verification.
    /// `declared_len` is the length the malformed header claimed.
    pub fn invalid(declared_len: usize) -> Self {
        Self {
            frame_type: FrameType::Invalid,
            payload: Bytes::from(declared_len.to_string()),
        }
    }

    /// Serializes the frame (header + payload) for transmission.
    ///
    /// Fails if the payload exceeds the 30-bit length field. `Invalid`
    /// frames are local-only and must not reach this method.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let header = encode_header(self.frame_type, self.payload.len())?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// The payload interpreted as UTF-8, lossily.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}|{} bytes]", self.frame_type, self.payload.len())
    }
}

/// Builds the 6-byte header for a frame of the given type and payload
/// length.
pub fn encode_header(frame_type: FrameType, len: usize) -> Result<[u8; HEADER_LEN], ProtocolError> {
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    let mut header = [0u8; HEADER_LEN];
    header[0] = MAGIC[0];
    header[1] = MAGIC[1];
    header[2] = ((len >> 24) as u8 & 0x3F) | (frame_type.id() << 6);
    header[3] = (len >> 16) as u8;
    header[4] = (len >> 8) as u8;
    header[5] = len as u8;
    Ok(header)
}

/// Decodes a 6-byte header into its frame type and payload length.
///
/// Fails with [`ProtocolError::BadMagic`] if the first two bytes do not
/// match [`MAGIC`]. The length bits are still extractable from a
/// malformed header via [`declared_len`], which the stream reader uses
/// to resynchronize.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<(FrameType, usize), ProtocolError> {
    if header[0] != MAGIC[0] || header[1] != MAGIC[1] {
        return Err(ProtocolError::BadMagic(header[0], header[1]));
    }
    Ok((FrameType::from_id(header[2] >> 6), declared_len(header)))
}

/// Extracts the 30-bit payload length from a header without verifying
/// the magic.
pub fn declared_len(header: &[u8; HEADER_LEN]) -> usize {
    ((header[2] as usize & 0x3F) << 24)
        | ((header[3] as usize) << 16)
        | ((header[4] as usize) << 8)
        | header[5] as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip_all_types() {
        for frame_type in [
            FrameType::SingleCommand,
            FrameType::CompoundCommand,
            FrameType::FileTransfer,
            FrameType::Answer,
        ] {
            for len in [0usize, 1, 1024, MAX_PAYLOAD_LEN] {
                let header = encode_header(frame_type, len).unwrap();
                let (decoded_type, decoded_len) = decode_header(&header).unwrap();
                assert_eq!(decoded_type, frame_type);
                assert_eq!(decoded_len, len);
            }
        }
    }

    #[test]
    fn test_payload_too_large() {
        let result = encode_header(FrameType::FileTransfer, MAX_PAYLOAD_LEN + 1);
        assert!(matches!(
            result,
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_bad_magic_first_byte() {
        let mut header = encode_header(FrameType::Answer, 5).unwrap();
        header[0] ^= 0xFF;
        assert!(matches!(
            decode_header(&header),
            Err(ProtocolError::BadMagic(_, _))
        ));
    }

    #[test]
    fn test_bad_magic_second_byte() {
        let mut header = encode_header(FrameType::Answer, 5).unwrap();
        header[1] = header[1].wrapping_add(1);
        assert!(matches!(
            decode_header(&header),
            Err(ProtocolError::BadMagic(_, _))
        ));
    }

    #[test]
    fn test_declared_len_survives_bad_magic() {
        let mut header = encode_header(FrameType::FileTransfer, 123_456).unwrap();
        header[0] = b'X';
        assert_eq!(declared_len(&header), 123_456);
    }

    #[test]
    fn test_type_bits_do_not_leak_into_length() {
        // Answer has type id 3, so both top bits of byte 2 are set.
        let header = encode_header(FrameType::Answer, MAX_PAYLOAD_LEN).unwrap();
        let (frame_type, len) = decode_header(&header).unwrap();
        assert_eq!(frame_type, FrameType::Answer);
        assert_eq!(len, MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_frame_encode() {
        let frame = Frame::command("login-Alice-pw1");
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[..2], &MAGIC);
        assert_eq!(bytes[2] >> 6, 0); // SingleCommand
        assert_eq!(bytes.len(), HEADER_LEN + 15);
        assert_eq!(&bytes[HEADER_LEN..], b"login-Alice-pw1");
    }

    #[test]
    fn test_frame_type_from_id_total() {
        assert_eq!(FrameType::from_id(0), FrameType::SingleCommand);
        assert_eq!(FrameType::from_id(1), FrameType::CompoundCommand);
        assert_eq!(FrameType::from_id(2), FrameType::FileTransfer);
        assert_eq!(FrameType::from_id(3), FrameType::Answer);
        // Only the low two bits are significant.
        assert_eq!(FrameType::from_id(0b0000_0111), FrameType::Answer);
    }

    #[test]
    fn test_empty_payload_frame() {
        let frame = Frame::new(FrameType::Answer, Bytes::new());
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN].try_into().unwrap();
        assert_eq!(decode_header(&header).unwrap(), (FrameType::Answer, 0));
    }
}
