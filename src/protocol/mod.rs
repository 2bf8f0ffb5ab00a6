//! Wire codec and typed message model.

pub mod codec;
pub mod message;

pub use codec::{CodecError, Reader};
pub use message::{Message, MessageError, MessageHeader, MessageKind, HEADER_SIZE};
