//! guac-gateway - Guacamole protocol gateway
//!
//! This library bridges browser-side transports to a guacd proxy daemon:
//! - Parses and serializes Guacamole protocol instructions
//! - Owns framed, timeout-bounded guacd connections with handshake support
//! - Filters the reader side per instruction (drop, rewrite, error)
//! - Intercepts in-band substreams so callers can siphon downloads into a
//!   writer or inject uploads from a reader, honoring `ack` flow control

#[macro_use]
mod logging;

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod tunnel;
pub mod ws;

pub use config::{load_config, ConnectionConfig, GatewayConfig};
pub use error::{GuacError, Result};
pub use protocol::{Instruction, Status, INTERNAL_DATA_OPCODE};
pub use session::SessionRegistry;
pub use tunnel::{
    FilteredReader, GuacdSocket, GuacdTunnel, InstructionFilter, InstructionReader,
    InterceptingTunnel, Tunnel, TunnelReader, TunnelWriter,
};
