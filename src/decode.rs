//! Packet decoding by container inheritance.
//!
//! Decoding starts at a root container and decodes its entries. It then looks for the
//! unique inheriting container whose restriction criteria match what has been decoded so
//! far, decodes that container's entries, and repeats until a container has no matching
//! inheritor.
use rayon::prelude::*;
use tracing::{trace, warn};
use typed_builder::TypedBuilder;

use crate::bits::BitReader;
use crate::criteria::all_match;
use crate::record::{Field, Record};
use crate::schema::{Entry, ParameterEntry, Schema, SequenceContainer};
use crate::{Error, Result};

/// Name of the root container used by CCSDS packet definitions.
pub const DEFAULT_ROOT: &str = "CCSDSPacket";

/// Decodes packets using a [Schema].
///
/// ```
/// use xtce::{Decoder, Schema};
///
/// let schema = Schema::build(Vec::<xtce::SequenceContainer>::new()).unwrap();
/// let decoder = Decoder::builder().root("Root").strict_length(true).build();
/// assert!(decoder.decode(&schema, &[0u8; 4]).is_err());
/// ```
#[derive(TypedBuilder, Debug, Clone)]
pub struct Decoder {
    /// Container decoding starts at.
    #[builder(default = DEFAULT_ROOT.to_string(), setter(into))]
    root: String,
    /// Fail with [Error::InvalidSize] if a packet is not fully consumed, or is too short,
    /// rather than only logging a warning.
    #[builder(default = false)]
    strict_length: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::builder().build()
    }
}

impl Decoder {
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Decode a single packet.
    ///
    /// # Errors
    /// [Error::ElementNotFound] if the root container does not exist,
    /// [Error::UnrecognizedPacketType] if inheritance cannot be resolved to a single
    /// container, and any error decoding a parameter.
    pub fn decode(&self, schema: &Schema, packet: &[u8]) -> Result<Record> {
        let mut container = schema.container(&self.root).ok_or_else(|| {
            Error::ElementNotFound(format!("root container {} does not exist", self.root))
        })?;
        let mut reader = BitReader::new(packet);
        let mut record = Record::with_binary_data(packet);

        loop {
            decode_entries(container, &mut reader, &mut record)?;

            let mut valid = Vec::new();
            for child in schema.inheritors(&container.name) {
                if all_match(&child.restriction_criteria, &record, None)? {
                    valid.push(child);
                }
            }

            match valid.as_slice() {
                [next] => {
                    trace!(
                        from = %container.name,
                        to = %next.name,
                        "inheriting container selected"
                    );
                    container = *next;
                }
                [] if container.is_abstract => {
                    record.set_bits_consumed(reader.position());
                    return Err(Error::UnrecognizedPacketType {
                        message: format!(
                            "abstract container {} has no inheritor matching the packet",
                            container.name
                        ),
                        partial: Box::new(record),
                    });
                }
                [] => break,
                many => {
                    let names: Vec<&str> = many.iter().map(|c| c.name.as_str()).collect();
                    record.set_bits_consumed(reader.position());
                    return Err(Error::UnrecognizedPacketType {
                        message: format!(
                            "multiple inheritors of {} match the packet: {}",
                            container.name,
                            names.join(", ")
                        ),
                        partial: Box::new(record),
                    });
                }
            }
        }

        record.set_bits_consumed(reader.position());
        self.check_length(&reader)?;
        Ok(record)
    }

    fn check_length(&self, reader: &BitReader) -> Result<()> {
        let consumed = reader.position();
        let available = reader.len_bits();
        if consumed == available {
            return Ok(());
        }
        if self.strict_length {
            return Err(Error::InvalidSize(format!(
                "decoded {consumed} bits of a {available} bit packet"
            )));
        }
        warn!(
            consumed,
            available, "decoded length does not match packet length"
        );
        Ok(())
    }

    /// Decode independent packets in parallel. Results are in the same order as
    /// `packets`.
    pub fn decode_all<P>(&self, schema: &Schema, packets: &[P]) -> Vec<Result<Record>>
    where
        P: AsRef<[u8]> + Sync,
    {
        packets
            .par_iter()
            .map(|p| self.decode(schema, p.as_ref()))
            .collect()
    }
}

fn decode_entries(
    container: &SequenceContainer,
    reader: &mut BitReader,
    record: &mut Record,
) -> Result<()> {
    for entry in &container.entries {
        match entry {
            Entry::Parameter(pe) => decode_parameter(pe, reader, record)?,
            Entry::Container(nested) => decode_entries(nested, reader, record)?,
        }
    }
    Ok(())
}

fn decode_parameter(entry: &ParameterEntry, reader: &mut BitReader, record: &mut Record) -> Result<()> {
    let parameter = &entry.parameter;
    if entry.repeat.is_some() {
        return Err(Error::Unsupported(format!(
            "repeated entry for parameter {}",
            parameter.name
        )));
    }
    if !all_match(&entry.include_condition, record, None)? {
        trace!(parameter = %parameter.name, "include condition false, skipping");
        return Ok(());
    }

    let ptype = &parameter.parameter_type;
    let (raw, derived) = ptype.decode(reader, record)?;
    let field = Field {
        name: parameter.name.clone(),
        raw,
        derived,
        unit: ptype.unit.clone(),
        short_description: parameter.short_description.clone(),
        long_description: parameter.long_description.clone(),
    };
    if !record.push(field) {
        warn!(parameter = %parameter.name, "parameter decoded more than once, keeping first value");
    }
    Ok(())
}

/// Decode `packet` starting at the container named `root`.
///
/// # Errors
/// See [Decoder::decode].
pub fn decode(packet: &[u8], schema: &Schema, root: &str) -> Result<Record> {
    Decoder::builder().root(root).build().decode(schema, packet)
}
