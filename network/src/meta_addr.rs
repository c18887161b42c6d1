//! Addresses gossiped via `getaddr`/`addr`, annotated with metadata the
//! address book uses to rank and expire peers.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, TimeZone, Utc};

use chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

use crate::protocol::external::types::PeerServices;

/// A single entry of an `addr` message: a timestamped, service-annotated
/// network address.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MetaAddr {
    pub addr: SocketAddr,
    pub services: PeerServices,
    /// The last time this address was seen advertised or connected to.
    pub last_seen: DateTime<Utc>,
}

impl MetaAddr {
    pub fn new(addr: SocketAddr, services: PeerServices) -> MetaAddr {
        MetaAddr {
            addr,
            services,
            last_seen: Utc::now(),
        }
    }
}

impl BitcoinSerialize for MetaAddr {
    fn bitcoin_serialize<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_u32::<LittleEndian>(self.last_seen.timestamp() as u32)?;
        self.services.bitcoin_serialize(&mut writer)?;
        write_ipv6_mapped(&mut writer, &self.addr)?;
        writer.write_u16::<BigEndian>(self.addr.port())
    }
}

impl BitcoinDeserialize for MetaAddr {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let timestamp = reader.read_u32::<LittleEndian>()?;
        let services = PeerServices::bitcoin_deserialize(&mut reader)?;
        let ip = read_ipv6_mapped(&mut reader)?;
        let port = reader.read_u16::<BigEndian>()?;
        Ok(MetaAddr {
            addr: SocketAddr::new(ip, port),
            services,
            last_seen: Utc.timestamp(timestamp as i64, 0),
        })
    }
}

/// Write an IPv4 or IPv6 address as a 16-byte IPv4-mapped-IPv6 value, per
/// the wire's address encoding.
fn write_ipv6_mapped<W: Write>(mut writer: W, addr: &SocketAddr) -> Result<(), io::Error> {
    let octets = match addr.ip() {
        std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        std::net::IpAddr::V6(v6) => v6.octets(),
    };
    writer.write_all(&octets)
}

fn read_ipv6_mapped<R: Read>(mut reader: R) -> Result<std::net::IpAddr, io::Error> {
    let mut octets = [0u8; 16];
    reader.read_exact(&mut octets)?;
    let v6 = std::net::Ipv6Addr::from(octets);
    Ok(match v6.to_ipv4_mapped() {
        Some(v4) => std::net::IpAddr::V4(v4),
        None => std::net::IpAddr::V6(v6),
    })
}
