//! Local socket plumbing: the inference protocol and the control channel.

pub mod client;
pub mod control;
pub mod framing;
pub mod protocol;
pub mod server;

pub use client::ProtocolClient;
pub use control::{ControlCommand, ControlHandler, ControlResponse, ControlServer};
pub use framing::Framing;
pub use protocol::{InferResult, Operation, Request, Response};
pub use server::{IpcServer, RequestHandler};
