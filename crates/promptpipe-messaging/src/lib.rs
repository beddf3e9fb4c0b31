//! Messaging transport: recipient validation and the HTTP gateway channel.

pub mod gateway;
pub mod recipient;

pub use gateway::{GatewayChannel, InboundMessage};
pub use recipient::validate_and_canonicalize;
