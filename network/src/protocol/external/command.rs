//! The 12-byte, NUL-padded ASCII command name that appears in every
//! frame header.

use std::io::{self, Read, Write};

use chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A single-byte-per-variant enum standing in for the wire's 12-byte
/// ASCII command string.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    Reject,
    GetAddr,
    Addr,
    GetBlocks,
    Inv,
    GetData,
    Block,
    Tx,
}

impl Command {
    /// The 12-byte, NUL-padded ASCII command name.
    pub fn bytes(self) -> &'static [u8; 12] {
        match self {
            Command::Version => b"version\0\0\0\0\0",
            Command::Verack => b"verack\0\0\0\0\0\0",
            Command::Ping => b"ping\0\0\0\0\0\0\0\0",
            Command::Pong => b"pong\0\0\0\0\0\0\0\0",
            Command::Reject => b"reject\0\0\0\0\0\0",
            Command::GetAddr => b"getaddr\0\0\0\0\0",
            Command::Addr => b"addr\0\0\0\0\0\0\0\0",
            Command::GetBlocks => b"getblocks\0\0\0",
            Command::Inv => b"inv\0\0\0\0\0\0\0\0\0",
            Command::GetData => b"getdata\0\0\0\0\0",
            Command::Block => b"block\0\0\0\0\0\0\0",
            Command::Tx => b"tx\0\0\0\0\0\0\0\0\0\0",
        }
    }
}

impl BitcoinSerialize for Command {
    fn bitcoin_serialize<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(self.bytes())
    }
}

impl BitcoinDeserialize for Command {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let bytes = <[u8; 12]>::bitcoin_deserialize(&mut reader)?;
        for command in [
            Command::Version,
            Command::Verack,
            Command::Ping,
            Command::Pong,
            Command::Reject,
            Command::GetAddr,
            Command::Addr,
            Command::GetBlocks,
            Command::Inv,
            Command::GetData,
            Command::Block,
            Command::Tx,
        ] {
            if command.bytes() == &bytes {
                return Ok(command);
            }
        }
        Err(SerializationError::Parse("unrecognized command string"))
    }
}
