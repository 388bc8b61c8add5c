//! Guacamole protocol instruction parser and encoder.
//!
//! Instructions use a length-prefixed format:
//! ```text
//! <length>.<element>,<length>.<element>,...;
//! ```
//!
//! Where the first element is the opcode and subsequent elements are
//! arguments. A length counts Unicode code points, not bytes: the frame
//! `4.name,7.rocket🚀;` carries a seven-code-point argument that is ten
//! bytes long on the wire.
//!
//! # Examples
//!
//! ```text
//! 6.select,3.vnc;            -> select("vnc")
//! 4.args,8.hostname,4.port;  -> args("hostname", "port")
//! 3.ack,1.1,2.OK,1.0;        -> ack("1", "OK", "0")
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{GuacError, Result};
use crate::protocol::Status;

/// Instruction terminator
const INST_TERM: u8 = b';';
/// Argument separator
const ARG_SEP: u8 = b',';
/// Length/element separator
const ELEM_SEP: u8 = b'.';

/// Opcode of frames that carry tunnel-internal data rather than remote
/// desktop traffic. Encodes as `0.`.
pub const INTERNAL_DATA_OPCODE: &str = "";

/// A Guacamole protocol instruction with opcode and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The instruction opcode (e.g., "select", "args", "blob", "ack")
    pub opcode: String,
    /// The instruction arguments
    pub args: Vec<String>,
}

/// Error produced while parsing an instruction from a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not enough data in the buffer to form a complete instruction.
    Incomplete,
    /// The instruction structure is invalid.
    Invalid(String),
}

impl From<ParseError> for GuacError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Incomplete => {
                GuacError::Malformed("unterminated instruction".to_string())
            }
            ParseError::Invalid(message) => GuacError::Malformed(message),
        }
    }
}

impl Instruction {
    /// Create a new instruction with the given opcode and arguments.
    pub fn new(opcode: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            opcode: opcode.into(),
            args,
        }
    }

    /// Create a `select` instruction naming a protocol or an existing
    /// connection id to join.
    pub fn select(target: &str) -> Self {
        Self::new("select", vec![target.to_string()])
    }

    /// Create a `size` instruction declaring the optimal display geometry.
    pub fn size(width: u32, height: u32, dpi: u32) -> Self {
        Self::new(
            "size",
            vec![width.to_string(), height.to_string(), dpi.to_string()],
        )
    }

    /// Create a `connect` instruction with parameter values in the order
    /// requested by the server's `args`.
    pub fn connect(values: Vec<String>) -> Self {
        Self::new("connect", values)
    }

    /// Create an `ack` instruction for a stream.
    pub fn ack(index: &str, message: &str, status: Status) -> Self {
        Self::new(
            "ack",
            vec![
                index.to_string(),
                message.to_string(),
                status.code().to_string(),
            ],
        )
    }

    /// Create a `blob` instruction carrying base64-encoded stream data.
    pub fn blob(index: &str, data: &str) -> Self {
        Self::new("blob", vec![index.to_string(), data.to_string()])
    }

    /// Create an `end` instruction closing a stream.
    pub fn end(index: &str) -> Self {
        Self::new("end", vec![index.to_string()])
    }

    /// Parse the first complete instruction at the beginning of `text`.
    ///
    /// Returns the parsed instruction and the number of **bytes** consumed,
    /// so callers can walk a buffer holding several concatenated frames.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Incomplete`] if the buffer ends before the
    /// terminating `;`, and [`ParseError::Invalid`] if a length prefix is
    /// missing or non-numeric, or if a declared length does not land on a
    /// `,` or `;` delimiter.
    pub fn parse(text: &str) -> std::result::Result<(Self, usize), ParseError> {
        let bytes = text.as_bytes();
        let mut pos = 0usize;
        let mut elements: Vec<String> = Vec::new();

        loop {
            // Length prefix: one or more ASCII digits followed by '.'
            let digits_start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(ParseError::Incomplete);
            }
            if pos == digits_start {
                return Err(ParseError::Invalid(format!(
                    "expected a length prefix at byte {pos}"
                )));
            }
            if bytes[pos] != ELEM_SEP {
                return Err(ParseError::Invalid(format!(
                    "length prefix not terminated by '.' at byte {pos}"
                )));
            }
            let length: usize = text[digits_start..pos].parse().map_err(|_| {
                ParseError::Invalid(format!(
                    "length prefix out of range: '{}'",
                    &text[digits_start..pos]
                ))
            })?;
            pos += 1;

            // Element value: exactly `length` code points.
            let start = pos;
            let mut chars = text[start..].chars();
            for _ in 0..length {
                match chars.next() {
                    Some(ch) => pos += ch.len_utf8(),
                    None => return Err(ParseError::Incomplete),
                }
            }
            elements.push(text[start..pos].to_string());

            match bytes.get(pos) {
                Some(&ARG_SEP) => pos += 1,
                Some(&INST_TERM) => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    return Err(ParseError::Invalid(format!(
                        "declared length {length} does not match the element starting at byte {start}"
                    )));
                }
                None => return Err(ParseError::Incomplete),
            }
        }

        let opcode = elements.remove(0);
        Ok((
            Self {
                opcode,
                args: elements,
            },
            pos,
        ))
    }

    /// Decode a single complete instruction, terminator included.
    ///
    /// # Errors
    ///
    /// Returns [`GuacError::Malformed`] on invalid UTF-8, a missing
    /// terminator, a bad length prefix, or trailing bytes after the frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| GuacError::Malformed("instruction is not valid UTF-8".to_string()))?;
        let (instruction, consumed) = Self::parse(text)?;
        if consumed != data.len() {
            return Err(GuacError::Malformed(
                "trailing bytes after instruction terminator".to_string(),
            ));
        }
        Ok(instruction)
    }

    /// Encode the instruction into its wire form.
    pub fn encode(&self) -> Bytes {
        let estimated = self.opcode.len()
            + self.args.iter().map(|arg| arg.len() + 8).sum::<usize>()
            + 8;
        let mut buffer = BytesMut::with_capacity(estimated);
        put_element(&mut buffer, &self.opcode);
        for arg in &self.args {
            buffer.put_u8(ARG_SEP);
            put_element(&mut buffer, arg);
        }
        buffer.put_u8(INST_TERM);
        buffer.freeze()
    }

    /// Check if this is a specific opcode.
    pub fn is(&self, opcode: &str) -> bool {
        self.opcode == opcode
    }

    /// Get the first argument, if any.
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// Get an argument by index.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|s| s.as_str())
    }
}

fn put_element(buffer: &mut BytesMut, element: &str) {
    buffer.put_slice(element.chars().count().to_string().as_bytes());
    buffer.put_u8(ELEM_SEP);
    buffer.put_slice(element.as_bytes());
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.opcode)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            // Blob payloads can run to kilobytes; keep log lines readable.
            if arg.chars().count() > 48 {
                let prefix: String = arg.chars().take(45).collect();
                write!(f, "{prefix:?}...")?;
            } else {
                write!(f, "{arg:?}")?;
            }
        }
        write!(f, ")")
    }
}
