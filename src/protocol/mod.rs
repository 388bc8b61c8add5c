//! Guacamole wire protocol: instruction framing and status codes.

mod instruction;
mod status;

pub use instruction::{Instruction, ParseError, INTERNAL_DATA_OPCODE};
pub use status::Status;
