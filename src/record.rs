use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A single decoded field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    /// Value as it appears in the packet.
    pub raw: Value,
    /// Calibrated, labeled, or otherwise converted value. Equal to `raw` when the field
    /// type defines no conversion.
    pub derived: Value,
    pub unit: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
}

impl Field {
    /// The raw or derived value, depending on `use_calibrated`.
    #[must_use]
    pub fn value(&self, use_calibrated: bool) -> &Value {
        if use_calibrated {
            &self.derived
        } else {
            &self.raw
        }
    }

    /// The first available description, short description preferred.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.short_description
            .as_deref()
            .or(self.long_description.as_deref())
    }
}

/// Fields decoded from a single packet, in the order they were decoded, along with the
/// packet bytes they were decoded from.
///
/// Fields are only ever appended; a name that is decoded twice (e.g., a container
/// referenced twice in the same packet) keeps its first value.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Field>,
    #[serde(with = "serde_bytes")]
    binary_data: Vec<u8>,
    bits_consumed: usize,
}

impl Record {
    /// Number of fields that make up a CCSDS primary header.
    pub const HEADER_FIELDS: usize = 7;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty record for fields decoded from `packet`.
    #[must_use]
    pub fn with_binary_data(packet: &[u8]) -> Self {
        Record {
            binary_data: packet.to_vec(),
            ..Self::default()
        }
    }

    /// Append a field. Returns `false`, leaving the record unchanged, if a field with the
    /// same name already exists.
    pub fn push(&mut self, field: Field) -> bool {
        match self.fields.entry(field.name.clone()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(field);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|f| &f.raw)
    }

    #[must_use]
    pub fn derived(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|f| &f.derived)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The leading [Record::HEADER_FIELDS] fields. Only meaningful for packets whose root
    /// container starts with a CCSDS primary header.
    pub fn header(&self) -> impl ExactSizeIterator<Item = &Field> {
        self.fields.values().take(Self::HEADER_FIELDS)
    }

    /// Fields following the header, see [Record::header].
    pub fn user_data(&self) -> impl ExactSizeIterator<Item = &Field> {
        self.fields.values().skip(Self::HEADER_FIELDS)
    }

    /// The packet bytes the fields were decoded from.
    #[must_use]
    pub fn binary_data(&self) -> &[u8] {
        &self.binary_data
    }

    /// Number of bits read from the packet buffer to produce this record.
    #[must_use]
    pub fn bits_consumed(&self) -> usize {
        self.bits_consumed
    }

    pub(crate) fn set_bits_consumed(&mut self, bits: usize) {
        self.bits_consumed = bits;
    }

    /// Render as a JSON object of field name to derived value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(name, f)| {
                (
                    name.clone(),
                    serde_json::to_value(&f.derived).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a Field;
    type IntoIter = indexmap::map::Values<'a, String, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.values()
    }
}
