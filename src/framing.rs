//! Splitting byte streams into packet buffers.
//!
//! Readers here only delimit packets; each buffer they produce is decoded independently,
//! e.g., with [crate::Decoder::decode] or [crate::Decoder::decode_all].
use std::io::{ErrorKind, Read};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{Error, Result};

/// Read up to `len` bytes, fewer only at EOF.
fn read_up_to<R: Read>(reader: &mut R, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

fn truncated(wanted: usize, got: usize, offset: usize) -> Error {
    Error::Io(std::io::Error::new(
        ErrorKind::UnexpectedEof,
        format!("truncated packet at offset {offset}: expected {wanted} bytes, got {got}"),
    ))
}

/// Iterator of fixed length packets, see [fixed_length].
pub struct FixedLengthIter<R> {
    reader: R,
    length: usize,
    offset: usize,
    done: bool,
}

impl<R: Read> Iterator for FixedLengthIter<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_up_to(&mut self.reader, self.length) {
            Ok(buf) if buf.is_empty() => {
                self.done = true;
                None
            }
            Ok(buf) if buf.len() < self.length => {
                self.done = true;
                Some(Err(truncated(self.length, buf.len(), self.offset)))
            }
            Ok(buf) => {
                self.offset += buf.len();
                Some(Ok(buf))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err.into()))
            }
        }
    }
}

/// Iterate over packets of `length` bytes read from `reader`.
///
/// The iterator ends at EOF. A partial trailing packet is returned as an error.
pub fn fixed_length<R: Read>(reader: R, length: usize) -> FixedLengthIter<R> {
    FixedLengthIter {
        reader,
        length: length.max(1),
        offset: 0,
        done: false,
    }
}

/// CCSDS space packet primary header.
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryHeader {
    #[builder(default)]
    pub version: u8,
    #[builder(default)]
    pub type_flag: u8,
    #[builder(default)]
    pub has_secondary_header: bool,
    /// Defaults to the idle packet APID.
    #[builder(default = PrimaryHeader::IDLE_APID)]
    pub apid: u16,
    /// Defaults to unsegmented.
    #[builder(default = 3)]
    pub sequence_flags: u8,
    #[builder(default)]
    pub sequence_count: u16,
}

impl PrimaryHeader {
    pub const LEN: usize = 6;
    pub const IDLE_APID: u16 = 2047;

    /// Length of the packet, including the header, from its first 6 bytes.
    #[must_use]
    pub fn packet_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Self::LEN + usize::from(u16::from_be_bytes([buf[4], buf[5]])) + 1)
    }

    fn validate(&self) -> Result<()> {
        let checks: [(&str, u64, u64); 5] = [
            ("version", self.version.into(), 7),
            ("type_flag", self.type_flag.into(), 1),
            ("apid", self.apid.into(), 2047),
            ("sequence_flags", self.sequence_flags.into(), 3),
            ("sequence_count", self.sequence_count.into(), 16383),
        ];
        for (name, value, max) in checks {
            if value > max {
                return Err(Error::InvalidHeader(format!(
                    "{name} must be between 0 and {max}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Create a CCSDS space packet from `header` and user `data`.
///
/// # Errors
/// [Error::InvalidHeader] if a header field does not fit in its bits or `data` is not 1 to
/// 65536 bytes.
pub fn create_ccsds_packet(header: &PrimaryHeader, data: &[u8]) -> Result<Vec<u8>> {
    header.validate()?;
    if data.is_empty() || data.len() > 65536 {
        return Err(Error::InvalidHeader(format!(
            "user data must be between 1 and 65536 bytes, got {}",
            data.len()
        )));
    }
    let word = u64::from(header.version) << 45
        | u64::from(header.type_flag) << 44
        | u64::from(header.has_secondary_header) << 43
        | u64::from(header.apid) << 32
        | u64::from(header.sequence_flags) << 30
        | u64::from(header.sequence_count) << 16
        | (data.len() as u64 - 1);
    let mut packet = Vec::with_capacity(PrimaryHeader::LEN + data.len());
    packet.extend_from_slice(&word.to_be_bytes()[2..]);
    packet.extend_from_slice(data);
    Ok(packet)
}

/// Iterator of CCSDS space packets, see [ccsds_packets].
pub struct CcsdsPacketIter<R> {
    reader: R,
    offset: usize,
    done: bool,
}

impl<R: Read> CcsdsPacketIter<R> {
    fn read_packet(&mut self) -> Result<Option<Vec<u8>>> {
        let mut packet = read_up_to(&mut self.reader, PrimaryHeader::LEN)?;
        if packet.is_empty() {
            return Ok(None);
        }
        let total = PrimaryHeader::packet_len(&packet)
            .ok_or_else(|| truncated(PrimaryHeader::LEN, packet.len(), self.offset))?;
        packet.resize(total, 0);
        self.reader
            .read_exact(&mut packet[PrimaryHeader::LEN..])
            .map_err(|err| match err.kind() {
                ErrorKind::UnexpectedEof => Error::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!(
                        "truncated packet at offset {}: expected {total} bytes",
                        self.offset
                    ),
                )),
                _ => err.into(),
            })?;
        self.offset += total;
        Ok(Some(packet))
    }
}

impl<R: Read> Iterator for CcsdsPacketIter<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_packet() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Iterate over CCSDS space packets read from `reader`, delimited by the packet length
/// in each primary header. Each item is the complete packet, header included.
///
/// The iterator ends at EOF. A partial trailing packet is returned as an error.
///
/// ```
/// use xtce::framing::{ccsds_packets, create_ccsds_packet, PrimaryHeader};
///
/// let header = PrimaryHeader::builder().apid(100).build();
/// let mut dat = create_ccsds_packet(&header, &[1, 2, 3]).unwrap();
/// dat.extend(create_ccsds_packet(&header, &[4]).unwrap());
///
/// let packets: Vec<Vec<u8>> = ccsds_packets(&dat[..]).map(Result::unwrap).collect();
/// assert_eq!(packets.len(), 2);
/// assert_eq!(packets[1].len(), 7);
/// ```
pub fn ccsds_packets<R: Read>(reader: R) -> CcsdsPacketIter<R> {
    CcsdsPacketIter {
        reader,
        offset: 0,
        done: false,
    }
}
