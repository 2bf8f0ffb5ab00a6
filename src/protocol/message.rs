//! Typed protocol messages.
//!
//! Every frame body is a fixed 16-byte header followed by a per-kind
//! payload. Wire format of the header:
//!
//! ```text
//! +0   Kind            (4 bytes LE32)
//! +4   Payload Length  (4 bytes LE32)
//! +8   Sequence Number (4 bytes LE32)
//! +12  Reserved        (4 bytes LE32, zero on write, ignored on read)
//! ```
//!
//! Kinds 7 and 8 are reserved on the wire (an earlier revision carried
//! resume negotiation in dedicated messages; it now rides on
//! [`Message::FileRequest`] / [`Message::FileResponse`]). They are never
//! emitted and are rejected as unknown on receipt.

use thiserror::Error;

use super::codec::{self, CodecError, Reader};
use crate::crypto::SecurityLevel;

/// Header size in bytes (4 x u32).
pub const HEADER_SIZE: usize = 16;

/// Message kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    /// Client hello carrying the requested security level.
    HandshakeRequest = 1,
    /// Server reply fixing the session's security level.
    HandshakeResponse = 2,
    /// Announces the next file and its destination path.
    FileRequest = 3,
    /// Accepts or rejects a file request, reporting the resume offset.
    FileResponse = 4,
    /// One chunk of file content at an explicit offset.
    FileData = 5,
    /// Acknowledges a single chunk.
    FileAck = 6,
    /// Out-of-band error report.
    ErrorMessage = 9,
}

impl MessageKind {
    /// Parse a kind from its wire value.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::HandshakeRequest),
            2 => Some(Self::HandshakeResponse),
            3 => Some(Self::FileRequest),
            4 => Some(Self::FileResponse),
            5 => Some(Self::FileData),
            6 => Some(Self::FileAck),
            9 => Some(Self::ErrorMessage),
            _ => None,
        }
    }

    /// Wire value of this kind.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Message encoding/decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Payload field decoding failed.
    #[error("payload decode failed: {0}")]
    Codec(#[from] CodecError),

    /// The buffer is shorter than the fixed header.
    #[error("message too short for header: {actual} bytes")]
    TruncatedHeader {
        /// Bytes actually present.
        actual: usize,
    },

    /// The header declares more payload than the buffer holds.
    #[error("incomplete payload: declared {declared} bytes, got {actual}")]
    IncompletePayload {
        /// Declared payload length.
        declared: usize,
        /// Bytes actually present after the header.
        actual: usize,
    },

    /// The kind field does not name a known message.
    #[error("unknown message kind: {0}")]
    UnknownKind(u32),

    /// The security level byte does not name a known suite.
    #[error("unknown security level: {0}")]
    UnknownSecurityLevel(u8),
}

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message kind (raw, validated during dispatch).
    pub kind: u32,
    /// Exact byte length of the payload that follows.
    pub payload_length: u32,
    /// Per-side monotone counter, starts at 1.
    pub sequence_number: u32,
    /// Must be zero on write; ignored on read.
    pub reserved: u32,
}

impl MessageHeader {
    /// Encode the header into `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        codec::put_u32(buf, self.kind);
        codec::put_u32(buf, self.payload_length);
        codec::put_u32(buf, self.sequence_number);
        codec::put_u32(buf, self.reserved);
    }

    /// Decode a header from the front of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        if buf.len() < HEADER_SIZE {
            return Err(MessageError::TruncatedHeader { actual: buf.len() });
        }
        let mut reader = Reader::new(&buf[..HEADER_SIZE]);
        Ok(Self {
            kind: reader.u32()?,
            payload_length: reader.u32()?,
            sequence_number: reader.u32()?,
            reserved: reader.u32()?,
        })
    }
}

/// A protocol message, one variant per wire kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client hello.
    HandshakeRequest {
        /// Client software version string.
        client_version: String,
        /// 16 random bytes.
        client_nonce: Vec<u8>,
        /// Requested security suite.
        security_level: SecurityLevel,
    },

    /// Server hello.
    HandshakeResponse {
        /// Server software version string.
        server_version: String,
        /// 16 random bytes.
        server_nonce: Vec<u8>,
        /// Whether the server demands shared-key authentication.
        authentication_required: bool,
        /// Suite the session will use.
        accepted_security_level: SecurityLevel,
    },

    /// Announce a file transfer.
    FileRequest {
        /// Local path on the client, informational only.
        source_path: String,
        /// Absolute destination path, forward slashes.
        destination_path: String,
        /// Set when part of a recursive directory transfer.
        recursive: bool,
        /// 0 for a fresh transfer; any non-zero value asks the server to
        /// report the current on-disk size.
        resume_offset: u64,
    },

    /// Accept or reject a file request.
    FileResponse {
        /// Whether the request was accepted.
        success: bool,
        /// Human-readable rejection reason, empty on success.
        error_message: String,
        /// Reserved, always 0.
        file_size: u64,
        /// Bytes already on disk; the offset the next chunk must start at.
        resume_offset: u64,
    },

    /// One chunk of file content.
    FileData {
        /// Byte position of this chunk in the original file.
        offset: u64,
        /// Chunk payload, possibly compressed.
        data: Vec<u8>,
        /// Set on the final chunk of the file.
        is_last_chunk: bool,
        /// Set when `data` is a zstd frame of the original chunk.
        compressed: bool,
    },

    /// Chunk acknowledgement.
    FileAck {
        /// `offset + raw chunk length` after a successful write.
        bytes_received: u64,
        /// Whether the write succeeded.
        success: bool,
        /// Failure reason, empty on success.
        error_message: String,
    },

    /// Out-of-band error report.
    ErrorMessage {
        /// Numeric error code.
        error_code: u32,
        /// Human-readable description.
        error_description: String,
    },
}

impl Message {
    /// Kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::HandshakeRequest { .. } => MessageKind::HandshakeRequest,
            Message::HandshakeResponse { .. } => MessageKind::HandshakeResponse,
            Message::FileRequest { .. } => MessageKind::FileRequest,
            Message::FileResponse { .. } => MessageKind::FileResponse,
            Message::FileData { .. } => MessageKind::FileData,
            Message::FileAck { .. } => MessageKind::FileAck,
            Message::ErrorMessage { .. } => MessageKind::ErrorMessage,
        }
    }

    /// True for the two handshake kinds, which travel in cleartext.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Message::HandshakeRequest { .. } | Message::HandshakeResponse { .. }
        )
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) {
        match self {
            Message::HandshakeRequest {
                client_version,
                client_nonce,
                security_level,
            } => {
                codec::put_string(buf, client_version);
                codec::put_bytes(buf, client_nonce);
                buf.push(security_level.as_u8());
            }
            Message::HandshakeResponse {
                server_version,
                server_nonce,
                authentication_required,
                accepted_security_level,
            } => {
                codec::put_string(buf, server_version);
                codec::put_bytes(buf, server_nonce);
                codec::put_bool(buf, *authentication_required);
                buf.push(accepted_security_level.as_u8());
            }
            Message::FileRequest {
                source_path,
                destination_path,
                recursive,
                resume_offset,
            } => {
                codec::put_string(buf, source_path);
                codec::put_string(buf, destination_path);
                codec::put_bool(buf, *recursive);
                codec::put_u64(buf, *resume_offset);
            }
            Message::FileResponse {
                success,
                error_message,
                file_size,
                resume_offset,
            } => {
                codec::put_bool(buf, *success);
                codec::put_string(buf, error_message);
                codec::put_u64(buf, *file_size);
                codec::put_u64(buf, *resume_offset);
            }
            Message::FileData {
                offset,
                data,
                is_last_chunk,
                compressed,
            } => {
                codec::put_u64(buf, *offset);
                codec::put_bytes(buf, data);
                codec::put_bool(buf, *is_last_chunk);
                codec::put_bool(buf, *compressed);
            }
            Message::FileAck {
                bytes_received,
                success,
                error_message,
            } => {
                codec::put_u64(buf, *bytes_received);
                codec::put_bool(buf, *success);
                codec::put_string(buf, error_message);
            }
            Message::ErrorMessage {
                error_code,
                error_description,
            } => {
                codec::put_u32(buf, *error_code);
                codec::put_string(buf, error_description);
            }
        }
    }

    /// Serialize header + payload with the given sequence number.
    pub fn serialize(&self, sequence_number: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        self.encode_payload(&mut payload);

        let header = MessageHeader {
            kind: self.kind().as_u32(),
            payload_length: payload.len() as u32,
            sequence_number,
            reserved: 0,
        };

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        header.encode(&mut buf);
        buf.extend_from_slice(&payload);
        buf
    }

    /// Deserialize a message, returning it with its sequence number.
    ///
    /// The buffer must hold the full header and at least the declared
    /// payload; trailing bytes beyond the declared length are ignored.
    pub fn deserialize(buf: &[u8]) -> Result<(Self, u32), MessageError> {
        let header = MessageHeader::decode(buf)?;
        let declared = header.payload_length as usize;
        let available = buf.len() - HEADER_SIZE;
        if available < declared {
            return Err(MessageError::IncompletePayload {
                declared,
                actual: available,
            });
        }

        let kind =
            MessageKind::from_u32(header.kind).ok_or(MessageError::UnknownKind(header.kind))?;
        let mut reader = Reader::new(&buf[HEADER_SIZE..HEADER_SIZE + declared]);

        let message = match kind {
            MessageKind::HandshakeRequest => {
                let client_version = reader.string()?;
                let client_nonce = reader.bytes()?;
                let level = reader.u8()?;
                Message::HandshakeRequest {
                    client_version,
                    client_nonce,
                    security_level: SecurityLevel::from_u8(level)
                        .ok_or(MessageError::UnknownSecurityLevel(level))?,
                }
            }
            MessageKind::HandshakeResponse => {
                let server_version = reader.string()?;
                let server_nonce = reader.bytes()?;
                let authentication_required = reader.bool()?;
                let level = reader.u8()?;
                Message::HandshakeResponse {
                    server_version,
                    server_nonce,
                    authentication_required,
                    accepted_security_level: SecurityLevel::from_u8(level)
                        .ok_or(MessageError::UnknownSecurityLevel(level))?,
                }
            }
            MessageKind::FileRequest => Message::FileRequest {
                source_path: reader.string()?,
                destination_path: reader.string()?,
                recursive: reader.bool()?,
                resume_offset: reader.u64()?,
            },
            MessageKind::FileResponse => Message::FileResponse {
                success: reader.bool()?,
                error_message: reader.string()?,
                file_size: reader.u64()?,
                resume_offset: reader.u64()?,
            },
            MessageKind::FileData => Message::FileData {
                offset: reader.u64()?,
                data: reader.bytes()?,
                is_last_chunk: reader.bool()?,
                compressed: reader.bool()?,
            },
            MessageKind::FileAck => Message::FileAck {
                bytes_received: reader.u64()?,
                success: reader.bool()?,
                error_message: reader.string()?,
            },
            MessageKind::ErrorMessage => Message::ErrorMessage {
                error_code: reader.u32()?,
                error_description: reader.string()?,
            },
        };

        Ok((message, header.sequence_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::HandshakeRequest {
                client_version: "NetCopy v1.0.0".to_string(),
                client_nonce: (0..16).collect(),
                security_level: SecurityLevel::High,
            },
            Message::HandshakeResponse {
                server_version: "NetCopy v1.0.0".to_string(),
                server_nonce: (16..32).collect(),
                authentication_required: true,
                accepted_security_level: SecurityLevel::Aes256Gcm,
            },
            Message::FileRequest {
                source_path: "/home/user/data.bin".to_string(),
                destination_path: "/var/lib/net_copy/data.bin".to_string(),
                recursive: false,
                resume_offset: 1,
            },
            Message::FileResponse {
                success: true,
                error_message: String::new(),
                file_size: 0,
                resume_offset: 4096,
            },
            Message::FileData {
                offset: 65536,
                data: vec![0xAB; 300],
                is_last_chunk: false,
                compressed: true,
            },
            Message::FileAck {
                bytes_received: 65836,
                success: true,
                error_message: String::new(),
            },
            Message::ErrorMessage {
                error_code: 42,
                error_description: "something went sideways".to_string(),
            },
        ]
    }

    #[test]
    fn test_header_layout() {
        let header = MessageHeader {
            kind: 5,
            payload_length: 0x0102,
            sequence_number: 7,
            reserved: 0,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[0..4], &5u32.to_le_bytes());
        assert_eq!(&buf[4..8], &0x0102u32.to_le_bytes());
        assert_eq!(&buf[8..12], &7u32.to_le_bytes());
        assert_eq!(&buf[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_reserved_ignored_on_read() {
        let mut buf = Message::FileAck {
            bytes_received: 3,
            success: true,
            error_message: String::new(),
        }
        .serialize(1);
        buf[12..16].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

        let (msg, seq) = Message::deserialize(&buf).unwrap();
        assert_eq!(seq, 1);
        assert!(matches!(msg, Message::FileAck { bytes_received: 3, .. }));
    }

    #[test]
    fn test_roundtrip_all_variants() {
        for (i, msg) in sample_messages().into_iter().enumerate() {
            let seq = i as u32 + 1;
            let buf = msg.serialize(seq);

            let header = MessageHeader::decode(&buf).unwrap();
            assert_eq!(header.payload_length as usize, buf.len() - HEADER_SIZE);

            let (decoded, decoded_seq) = Message::deserialize(&buf).unwrap();
            assert_eq!(decoded, msg);
            assert_eq!(decoded_seq, seq);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut buf = sample_messages()[0].serialize(1);
        buf[0..4].copy_from_slice(&0xBEEFu32.to_le_bytes());
        assert_eq!(
            Message::deserialize(&buf).unwrap_err(),
            MessageError::UnknownKind(0xBEEF)
        );
    }

    #[test]
    fn test_reserved_kinds_rejected() {
        // 7/8 were once ResumeRequest/ResumeResponse; resume now rides on
        // FileRequest/FileResponse.
        for kind in [7u32, 8] {
            let mut buf = sample_messages()[2].serialize(1);
            buf[0..4].copy_from_slice(&kind.to_le_bytes());
            assert_eq!(
                Message::deserialize(&buf).unwrap_err(),
                MessageError::UnknownKind(kind)
            );
        }
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert_eq!(
            Message::deserialize(&[0u8; 10]).unwrap_err(),
            MessageError::TruncatedHeader { actual: 10 }
        );
    }

    #[test]
    fn test_incomplete_payload_rejected() {
        let buf = sample_messages()[4].serialize(1);
        let cut = &buf[..buf.len() - 5];
        assert!(matches!(
            Message::deserialize(cut).unwrap_err(),
            MessageError::IncompletePayload { .. }
        ));
    }

    #[test]
    fn test_unknown_security_level_rejected() {
        let msg = Message::HandshakeRequest {
            client_version: "NetCopy v1.0.0".to_string(),
            client_nonce: vec![0; 16],
            security_level: SecurityLevel::Fast,
        };
        let mut buf = msg.serialize(1);
        let last = buf.len() - 1;
        buf[last] = 0x77; // clobber the level byte
        assert_eq!(
            Message::deserialize(&buf).unwrap_err(),
            MessageError::UnknownSecurityLevel(0x77)
        );
    }

    #[test]
    fn test_empty_file_data_chunk() {
        let msg = Message::FileData {
            offset: 0,
            data: Vec::new(),
            is_last_chunk: true,
            compressed: false,
        };
        let buf = msg.serialize(3);
        let (decoded, _) = Message::deserialize(&buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
