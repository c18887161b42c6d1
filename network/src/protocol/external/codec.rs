//! A Tokio codec mapping byte streams to [`Message`] streams.
//!
//! Every frame has the same 24-byte header (`magic`, 12-byte `command`,
//! `length`, `checksum`) regardless of payload shape; what differs is the
//! payload itself. Handshake and gossip messages keep the compact binary
//! layout the wire has always used; inventory, sync, and data-transfer
//! messages are instead a single JSON object, to stay easy to extend and
//! to inspect on the wire.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use chain::{block, parameters::Network, transaction::Transaction, BitcoinDeserialize, BitcoinSerialize};

use crate::constants;
use crate::meta_addr::MetaAddr;

use super::command::Command;
use super::inv::InventoryHash;
use super::message::{JsonPayload, Message, Version};
use super::types::{Magic, Nonce, ProtocolVersion};

/// The length of the frame header: `magic(4) + command(12) + length(4) + checksum(4)`.
const HEADER_LEN: usize = 24;

/// A codec turning a byte stream into a stream of [`Message`]s and back.
pub struct Codec {
    builder: Builder,
    state: DecodeState,
}

pub struct Builder {
    network: Network,
    version: ProtocolVersion,
    max_len: usize,
    metrics_label: Option<String>,
}

impl Codec {
    pub fn builder() -> Builder {
        Builder {
            network: Network::Mainnet,
            version: constants::CURRENT_VERSION,
            max_len: constants::MAX_MESSAGE_LEN,
            metrics_label: None,
        }
    }

    pub fn reconfigure_version(&mut self, version: ProtocolVersion) {
        self.builder.version = version;
    }
}

impl Builder {
    pub fn finish(self) -> Codec {
        Codec {
            builder: self,
            state: DecodeState::Head,
        }
    }

    pub fn for_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    #[allow(dead_code)]
    pub fn for_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    #[allow(dead_code)]
    pub fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_len = len;
        self
    }

    pub fn with_metrics_label(mut self, metrics_label: String) -> Self {
        self.metrics_label = Some(metrics_label);
        self
    }
}

// ======== Encoding =========

impl Encoder<Message> for Codec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = Vec::new();
        self.write_body(&item, &mut body)?;

        if body.len() > self.builder.max_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "body length exceeded maximum size",
            ));
        }

        if let Some(label) = self.builder.metrics_label.clone() {
            metrics::counter!("bytes.written", (body.len() + HEADER_LEN) as u64, "addr" => label);
        }

        let command = item.command();
        trace!(item = %item, len = body.len());

        let checksum = checksum(&body);
        let mut header = [0u8; HEADER_LEN];
        {
            let mut w = Cursor::new(&mut header[..]);
            w.write_all(&constants::magic_for(self.builder.network).0)?;
            w.write_all(command.bytes())?;
            w.write_u32::<LittleEndian>(body.len() as u32)?;
            w.write_all(&checksum)?;
        }

        dst.reserve(HEADER_LEN + body.len());
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&body);

        Ok(())
    }
}

use std::io::Write;

fn checksum(body: &[u8]) -> [u8; 4] {
    let digest = chain::sha256d::sha256d(body);
    [digest[0], digest[1], digest[2], digest[3]]
}

impl Codec {
    fn write_body<W: Write>(&self, msg: &Message, mut writer: W) -> Result<(), std::io::Error> {
        match msg {
            Message::Version(inner) => inner.bitcoin_serialize(&mut writer)?,
            Message::Verack => {}
            Message::Ping(nonce) => nonce.bitcoin_serialize(&mut writer)?,
            Message::Pong(nonce) => nonce.bitcoin_serialize(&mut writer)?,
            Message::GetAddr => {}
            Message::Addr(addrs) => addrs.bitcoin_serialize(&mut writer)?,
            Message::GetBlocks { locator, stop } => {
                let payload = JsonPayload::GetBlocks {
                    locator: locator.iter().map(|h| h.to_string()).collect(),
                    stop: stop.as_ref().map(|h| h.to_string()),
                };
                writer.write_all(&serde_json::to_vec(&payload)?)?;
            }
            Message::Inv(items) => {
                let payload = JsonPayload::Inv { items: items.clone() };
                writer.write_all(&serde_json::to_vec(&payload)?)?;
            }
            Message::GetData(items) => {
                let payload = JsonPayload::GetData { items: items.clone() };
                writer.write_all(&serde_json::to_vec(&payload)?)?;
            }
            Message::Block(block) => {
                let mut raw = Vec::new();
                block.bitcoin_serialize(&mut raw)?;
                let payload = JsonPayload::Block {
                    payload: hex::encode(&raw),
                };
                writer.write_all(&serde_json::to_vec(&payload)?)?;
            }
            Message::Tx(tx) => {
                let mut raw = Vec::new();
                tx.bitcoin_serialize(&mut raw)?;
                let payload = JsonPayload::Tx {
                    payload: hex::encode(&raw),
                };
                writer.write_all(&serde_json::to_vec(&payload)?)?;
            }
            Message::Reject { message, reason } => {
                let payload = JsonPayload::Reject {
                    message: message.clone(),
                    reason: reason.clone(),
                };
                writer.write_all(&serde_json::to_vec(&payload)?)?;
            }
        }
        Ok(())
    }
}

// ======== Decoding =========

enum DecodeState {
    Head,
    Body {
        body_len: usize,
        command: Command,
        checksum: [u8; 4],
    },
}

impl fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeState::Head => write!(f, "DecodeState::Head"),
            DecodeState::Body { body_len, command, .. } => f
                .debug_struct("DecodeState::Body")
                .field("body_len", &body_len)
                .field("command", command)
                .finish(),
        }
    }
}

impl Decoder for Codec {
    type Item = Message;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        use std::io::{Error, ErrorKind};
        match self.state {
            DecodeState::Head => {
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }
                let header = src.split_to(HEADER_LEN);
                let mut reader = Cursor::new(&header);
                let magic = Magic(<[u8; 4]>::bitcoin_deserialize(&mut reader).map_err(to_io)?);
                let command = Command::bitcoin_deserialize(&mut reader).map_err(to_io)?;
                let body_len = reader.read_u32::<LittleEndian>()? as usize;
                let checksum = <[u8; 4]>::bitcoin_deserialize(&mut reader).map_err(to_io)?;

                if magic != constants::magic_for(self.builder.network) {
                    return Err(Error::new(ErrorKind::InvalidData, "bad network magic"));
                }
                if body_len > self.builder.max_len {
                    return Err(Error::new(ErrorKind::InvalidData, "body length exceeded maximum size"));
                }

                if let Some(label) = self.builder.metrics_label.clone() {
                    metrics::counter!("bytes.read", (body_len + HEADER_LEN) as u64, "addr" => label);
                }

                src.reserve(body_len + HEADER_LEN);
                self.state = DecodeState::Body {
                    body_len,
                    command,
                    checksum,
                };
                self.decode(src)
            }
            DecodeState::Body { body_len, command, checksum: expected } => {
                if src.len() < body_len {
                    return Ok(None);
                }
                let body = src.split_to(body_len);
                self.state = DecodeState::Head;

                if checksum(&body) != expected {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        "message checksum did not match computed checksum",
                    ));
                }

                let mut reader = Cursor::new(&body);
                let msg = match command {
                    Command::Version => Message::Version(Version::bitcoin_deserialize(&mut reader).map_err(to_io)?),
                    Command::Verack => Message::Verack,
                    Command::Ping => Message::Ping(Nonce::bitcoin_deserialize(&mut reader).map_err(to_io)?),
                    Command::Pong => Message::Pong(Nonce::bitcoin_deserialize(&mut reader).map_err(to_io)?),
                    Command::GetAddr => Message::GetAddr,
                    Command::Addr => Message::Addr(Vec::<MetaAddr>::bitcoin_deserialize(&mut reader).map_err(to_io)?),
                    Command::GetBlocks | Command::Inv | Command::GetData | Command::Block | Command::Tx | Command::Reject => {
                        self.read_json(command, &body)?
                    }
                };
                Ok(Some(msg))
            }
        }
    }
}

fn to_io(e: chain::SerializationError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
}

impl Codec {
    fn read_json(&self, command: Command, body: &[u8]) -> Result<Message, std::io::Error> {
        use std::io::{Error, ErrorKind};
        let payload: JsonPayload =
            serde_json::from_slice(body).map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;
        match (command, payload) {
            (Command::GetBlocks, JsonPayload::GetBlocks { locator, stop }) => {
                let locator = locator
                    .iter()
                    .map(|h| h.parse())
                    .collect::<Result<Vec<block::Hash>, _>>()
                    .map_err(|_: chain::SerializationError| Error::new(ErrorKind::InvalidData, "bad locator hash"))?;
                let stop = stop
                    .map(|h| h.parse())
                    .transpose()
                    .map_err(|_: chain::SerializationError| Error::new(ErrorKind::InvalidData, "bad stop hash"))?;
                Ok(Message::GetBlocks { locator, stop })
            }
            (Command::Inv, JsonPayload::Inv { items }) => Ok(Message::Inv(items)),
            (Command::GetData, JsonPayload::GetData { items }) => Ok(Message::GetData(items)),
            (Command::Block, JsonPayload::Block { payload }) => {
                let raw = hex::decode(payload).map_err(|_| Error::new(ErrorKind::InvalidData, "bad block hex"))?;
                let mut buf = BytesMut::from(&raw[..]);
                let block = block::Block::deserialize_from_buf(&mut buf).map_err(to_io)?;
                Ok(Message::Block(Arc::new(block)))
            }
            (Command::Tx, JsonPayload::Tx { payload }) => {
                let raw = hex::decode(payload).map_err(|_| Error::new(ErrorKind::InvalidData, "bad tx hex"))?;
                let tx = Transaction::bitcoin_deserialize(&mut Cursor::new(raw)).map_err(to_io)?;
                Ok(Message::Tx(Arc::new(tx)))
            }
            (Command::Reject, JsonPayload::Reject { message, reason }) => Ok(Message::Reject { message, reason }),
            _ => Err(Error::new(ErrorKind::InvalidData, "json payload did not match its command")),
        }
    }
}
