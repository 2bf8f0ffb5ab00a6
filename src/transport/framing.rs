//! Length-prefixed frame transport over a reliable byte stream.
//!
//! A frame on the wire is a u32 little-endian outer length followed by
//! exactly that many bytes: the serialized message for handshake frames,
//! or the suite's encrypted envelope for everything after the handshake.
//! Short reads loop until the full count is satisfied; end-of-stream,
//! oversized frames, decrypt failures and unknown kinds all terminate the
//! session.

use std::io::{Read, Write};

use thiserror::Error;
use tracing::trace;

use crate::core::{CryptoError, MAX_FRAME_SIZE};
use crate::crypto::FrameCipher;
use crate::protocol::{Message, MessageError, MessageKind};

/// Fatal transport failures. Any of these closes the connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network send/receive failure, including end-of-stream mid-frame.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The outer length prefix exceeds the frame cap.
    #[error("frame too large: {length} bytes (cap {max})")]
    FrameTooLarge {
        /// Declared outer length.
        length: usize,
        /// Configured cap.
        max: usize,
    },

    /// Header or payload failed to decode.
    #[error("protocol error: {0}")]
    Message(#[from] MessageError),

    /// Frame failed to decrypt.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A well-formed message arrived in the wrong protocol state.
    #[error("unexpected {got:?} while waiting for {expected}")]
    UnexpectedMessage {
        /// What the state machine was waiting for.
        expected: &'static str,
        /// Kind that actually arrived.
        got: MessageKind,
    },
}

/// Framed, optionally encrypted message stream.
///
/// Owns the byte stream, the session cipher, and the per-side sequence
/// counter. Exclusively held by the thread driving its connection.
pub struct FrameTransport<S: Read + Write> {
    stream: S,
    cipher: Option<Box<dyn FrameCipher>>,
    handshake_done: bool,
    next_sequence: u32,
}

impl<S: Read + Write> FrameTransport<S> {
    /// Wrap a connected stream. Frames travel in cleartext until
    /// [`finish_handshake`](Self::finish_handshake) installs a cipher.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            cipher: None,
            handshake_done: false,
            next_sequence: 1,
        }
    }

    /// Install the negotiated cipher and switch to encrypted frames.
    ///
    /// Called after the handshake response has been written (server) or
    /// read (client); every subsequent frame is encrypted end-to-end.
    pub fn finish_handshake(&mut self, cipher: Box<dyn FrameCipher>) {
        self.cipher = Some(cipher);
        self.handshake_done = true;
    }

    /// Whether the handshake has completed.
    pub fn handshake_done(&self) -> bool {
        self.handshake_done
    }

    /// Access the underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Serialize, encrypt when past handshake, and write one frame.
    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let mut buf = message.serialize(sequence);
        if self.handshake_done {
            if let Some(cipher) = self.cipher.as_mut() {
                buf = cipher.encrypt(&buf)?;
            }
        }

        trace!(kind = ?message.kind(), sequence, bytes = buf.len(), "sending frame");

        self.stream.write_all(&(buf.len() as u32).to_le_bytes())?;
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read exactly one frame, decrypt when past handshake, and decode it.
    pub fn recv(&mut self) -> Result<Message, TransportError> {
        let mut length_bytes = [0u8; 4];
        self.stream.read_exact(&mut length_bytes)?;
        let length = u32::from_le_bytes(length_bytes) as usize;

        if length > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                length,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = vec![0u8; length];
        self.stream.read_exact(&mut buf)?;

        if self.handshake_done {
            if let Some(cipher) = self.cipher.as_mut() {
                buf = cipher.decrypt(&buf)?;
            }
        }

        let (message, sequence) = Message::deserialize(&buf)?;
        trace!(kind = ?message.kind(), sequence, bytes = length, "received frame");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{create_cipher, SecretKey, SecurityLevel};
    use std::net::{TcpListener, TcpStream};

    fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn key() -> SecretKey {
        SecretKey::from_bytes([7u8; 32])
    }

    fn ack(bytes_received: u64) -> Message {
        Message::FileAck {
            bytes_received,
            success: true,
            error_message: String::new(),
        }
    }

    #[test]
    fn test_plaintext_roundtrip_before_handshake() {
        let (a, b) = stream_pair();
        let mut sender = FrameTransport::new(a);
        let mut receiver = FrameTransport::new(b);

        sender.send(&ack(123)).unwrap();
        assert_eq!(receiver.recv().unwrap(), ack(123));
    }

    #[test]
    fn test_encrypted_roundtrip_after_handshake() {
        for level in [
            SecurityLevel::High,
            SecurityLevel::Fast,
            SecurityLevel::Aes,
            SecurityLevel::Aes256Gcm,
        ] {
            let (a, b) = stream_pair();
            let mut sender = FrameTransport::new(a);
            let mut receiver = FrameTransport::new(b);
            sender.finish_handshake(create_cipher(level, &key()));
            receiver.finish_handshake(create_cipher(level, &key()));

            sender.send(&ack(99)).unwrap();
            assert_eq!(receiver.recv().unwrap(), ack(99), "roundtrip for {level:?}");
        }
    }

    #[test]
    fn test_encrypted_frame_is_not_plaintext() {
        let (a, b) = stream_pair();
        let mut sender = FrameTransport::new(a);
        sender.finish_handshake(create_cipher(SecurityLevel::High, &key()));

        let msg = Message::FileRequest {
            source_path: "src".into(),
            destination_path: "/tmp/out/plaintext-marker".into(),
            recursive: false,
            resume_offset: 0,
        };
        sender.send(&msg).unwrap();

        // Read the raw frame off the wire; the path must not appear.
        let mut raw = FrameTransport::new(b);
        let mut length_bytes = [0u8; 4];
        raw.stream.read_exact(&mut length_bytes).unwrap();
        let mut frame = vec![0u8; u32::from_le_bytes(length_bytes) as usize];
        raw.stream.read_exact(&mut frame).unwrap();

        let needle = b"plaintext-marker";
        assert!(!frame
            .windows(needle.len())
            .any(|window| window == needle));
    }

    #[test]
    fn test_wrong_key_is_fatal() {
        let (a, b) = stream_pair();
        let mut sender = FrameTransport::new(a);
        let mut receiver = FrameTransport::new(b);
        sender.finish_handshake(create_cipher(SecurityLevel::High, &key()));
        receiver.finish_handshake(create_cipher(
            SecurityLevel::High,
            &SecretKey::from_bytes([8u8; 32]),
        ));

        sender.send(&ack(1)).unwrap();
        assert!(matches!(
            receiver.recv().unwrap_err(),
            TransportError::Crypto(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let (mut a, b) = stream_pair();
        a.write_all(&(u32::MAX).to_le_bytes()).unwrap();

        let mut receiver = FrameTransport::new(b);
        assert!(matches!(
            receiver.recv().unwrap_err(),
            TransportError::FrameTooLarge { .. }
        ));
    }

    #[test]
    fn test_truncated_stream_is_fatal() {
        let (mut a, b) = stream_pair();
        // Announce 100 bytes, deliver 3, close.
        a.write_all(&100u32.to_le_bytes()).unwrap();
        a.write_all(&[1, 2, 3]).unwrap();
        drop(a);

        let mut receiver = FrameTransport::new(b);
        assert!(matches!(
            receiver.recv().unwrap_err(),
            TransportError::Io(_)
        ));
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let (mut a, b) = stream_pair();
        let mut frame = ack(1).serialize(1);
        frame[0..4].copy_from_slice(&7u32.to_le_bytes()); // reserved kind
        a.write_all(&(frame.len() as u32).to_le_bytes()).unwrap();
        a.write_all(&frame).unwrap();

        let mut receiver = FrameTransport::new(b);
        assert!(matches!(
            receiver.recv().unwrap_err(),
            TransportError::Message(MessageError::UnknownKind(7))
        ));
    }
}
