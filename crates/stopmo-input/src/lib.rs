// ABOUTME: Button input for stopmo: command sources (serial device or keyboard) and the forwarder.
// ABOUTME: The forwarder maps raw tokens to event kinds and posts them to the server's ingress.

pub mod forwarder;
pub mod mapping;
pub mod source;

pub use forwarder::{
    DEFAULT_BACKEND, FORWARD_TIMEOUT, ForwardError, ForwardOutcome, ForwardStats, Forwarder,
};
pub use mapping::map_token;
pub use source::{CommandSource, DeviceSource, KeyboardSource, TokenStream, probe};
