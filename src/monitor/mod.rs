//! Wire protocol between the core and the monitor/UI process (§4.6):
//! length-prefixed `bincode` messages over a Unix-domain socket.
//!
//! Grounded on `examples/original_source/src/mon/client.h`'s `Client::send`
//! (a `uint32` big-endian size prefix followed by the serialized payload)
//! and `examples/original_source/src/mon/main.cc`'s message handlers.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

/// A function identity, carried alongside most messages so the monitor can
/// key its running/completed job tables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Function {
    pub name: String,
    pub address: Option<u64>,
}

impl Function {
    pub fn new(name: impl Into<String>, address: Option<u64>) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Message {
    ClientConnect {
        pid: u32,
    },
    FunctionStarted {
        function: Function,
    },
    FunctionCompleted {
        function: Function,
    },
    FunctionProgress {
        function: Function,
        frac: f32,
    },
    FunctionsAnalyzed {
        functions: Vec<Function>,
    },
    FunctionStep {
        function: Function,
        step: String,
    },
    FunctionProperties {
        function: Function,
        properties: HashMap<String, String>,
    },
}

/// Serializes `msg` and writes it as `<u32 big-endian length><payload>`.
pub fn write_message<W: Write>(writer: &mut W, msg: &Message) -> Result<()> {
    let payload = bincode::serialize(msg)?;
    let len = u32::try_from(payload.len()).map_err(|_| "monitor message too large to frame")?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Reads one length-prefixed frame and deserializes it as a `Message`.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(bincode::deserialize(&payload)?)
}

/// The core side's handle on the monitor socket. A missing or broken
/// connection degrades to a no-op sender: monitor I/O failure must never
/// fail the analysis itself (§7 "Monitor I/O failure").
pub struct Client {
    stream: Option<UnixStream>,
}

impl Client {
    /// Connects to the monitor's socket and announces this process's pid.
    /// Connection failure is reported, not swallowed - callers that want the
    /// "proceed without telemetry" behavior should fall back to
    /// `Client::disconnected` on error.
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        let mut client = Self { stream: Some(stream) };
        client.send(&Message::ClientConnect { pid: std::process::id() })?;
        Ok(client)
    }

    /// A client with no backing socket: every `send` is a silent no-op.
    pub fn disconnected() -> Self {
        Self { stream: None }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn send(&mut self, msg: &Message) -> Result<()> {
        match &mut self.stream {
            Some(stream) => write_message(stream, msg),
            None => Ok(()),
        }
    }

    /// Sends `msg`, dropping the connection (falling back to
    /// `disconnected` behavior for all future sends) on any I/O error.
    pub fn send_lossy(&mut self, msg: &Message) {
        if let Err(e) = self.send(msg) {
            eprintln!("warning: monitor connection lost: {}", e);
            self.stream = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn message_round_trips_through_the_length_prefixed_frame() {
        let msg = Message::FunctionProgress {
            function: Function::new("victim", Some(0x1000)),
            frac: 0.5,
        };

        let mut buf = Vec::new();
        write_message(&mut buf, &msg).unwrap();

        // length prefix is big-endian and matches the payload length.
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);

        let mut cursor = Cursor::new(buf);
        let decoded = read_message(&mut cursor).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn disconnected_client_silently_drops_every_message() {
        let mut client = Client::disconnected();
        assert!(!client.is_connected());
        client
            .send(&Message::FunctionStarted {
                function: Function::new("f", None),
            })
            .unwrap();
    }

    #[test]
    fn functions_analyzed_carries_every_function() {
        let msg = Message::FunctionsAnalyzed {
            functions: vec![Function::new("a", None), Function::new("b", Some(4))],
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = read_message(&mut cursor).unwrap();
        assert_eq!(decoded, msg);
    }
}
