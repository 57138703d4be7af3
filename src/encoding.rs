//! Bit level layout of parameter values.
//!
//! An encoding reads the raw value of a parameter from a [BitReader]. Calibration of
//! numeric values is attached to the encoding but applied by the parameter type, see
//! [crate::types::ParameterType::decode].
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bits::BitReader;
use crate::calibrate::{Calibration, Calibrator, ContextCalibrator};
use crate::criteria::{first_lookup, DiscreteLookup};
use crate::record::Record;
use crate::value::Value;
use crate::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    #[serde(alias = "mostSignificantByteFirst")]
    BigEndian,
    #[serde(alias = "leastSignificantByteFirst")]
    LittleEndian,
}

impl FromStr for ByteOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mostSignificantByteFirst" | "BigEndian" => Ok(ByteOrder::BigEndian),
            "leastSignificantByteFirst" | "LittleEndian" => Ok(ByteOrder::LittleEndian),
            other => Err(Error::InvalidSchema(format!("unrecognized byte order {other:?}"))),
        }
    }
}

/// Reverse the byte order of the low `nbits` of `value`, over the minimum number of bytes
/// covering `nbits`.
fn swap_bytes(value: u64, nbits: usize) -> u64 {
    let nbytes = (nbits + 7) / 8;
    let be = value.to_be_bytes();
    be[8 - nbytes..]
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Integer representation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signedness {
    #[default]
    Unsigned,
    TwosComplement,
    SignMagnitude,
    OnesComplement,
}

impl Signedness {
    /// Interpret the low `nbits` of `value`.
    #[must_use]
    pub fn interpret(self, value: u64, nbits: usize) -> i128 {
        let value = i128::from(value);
        let sign_bit = 1i128 << (nbits - 1);
        let negative = value & sign_bit != 0;
        match self {
            Signedness::Unsigned => value,
            Signedness::TwosComplement if negative => value - (1i128 << nbits),
            Signedness::SignMagnitude if negative => -(value & (sign_bit - 1)),
            Signedness::OnesComplement if negative => value - ((1i128 << nbits) - 1),
            _ => value,
        }
    }
}

impl FromStr for Signedness {
    type Err = Error;

    /// Accepts the schema spellings, including the common `signed` and `twosCompliment`
    /// misspellings which mean two's complement.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unsigned" => Ok(Signedness::Unsigned),
            "signed" | "twosComplement" | "twosCompliment" => Ok(Signedness::TwosComplement),
            "signMagnitude" => Ok(Signedness::SignMagnitude),
            "onesComplement" | "onesCompliment" => Ok(Signedness::OnesComplement),
            other => Err(Error::InvalidSchema(format!(
                "unrecognized integer encoding {other:?}"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IntegerEncoding {
    size_in_bits: usize,
    signedness: Signedness,
    byte_order: ByteOrder,
    calibration: Calibration,
}

impl IntegerEncoding {
    /// # Errors
    /// [Error::InvalidSchema] if `size_in_bits` is not in `1..=64`.
    pub fn new(size_in_bits: usize, signedness: Signedness) -> Result<Self> {
        if size_in_bits == 0 || size_in_bits > 64 {
            return Err(Error::InvalidSchema(format!(
                "integer encodings must be 1 to 64 bits, got {size_in_bits}"
            )));
        }
        Ok(IntegerEncoding {
            size_in_bits,
            signedness,
            byte_order: ByteOrder::BigEndian,
            calibration: Calibration::default(),
        })
    }

    #[must_use]
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    #[must_use]
    pub fn with_calibrator(mut self, calibrator: Calibrator) -> Self {
        self.calibration.default = Some(calibrator);
        self
    }

    #[must_use]
    pub fn with_context_calibrator(mut self, context: ContextCalibrator) -> Self {
        self.calibration.context.push(context);
        self
    }

    #[must_use]
    pub fn size_in_bits(&self) -> usize {
        self.size_in_bits
    }

    #[must_use]
    pub fn signedness(&self) -> Signedness {
        self.signedness
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// # Errors
    /// [Error::OutOfBounds] if there is not enough data.
    pub fn read(&self, reader: &mut BitReader) -> Result<i128> {
        let mut value = reader.read_bits_as_int(self.size_in_bits)?;
        if self.byte_order == ByteOrder::LittleEndian {
            value = swap_bytes(value, self.size_in_bits);
        }
        Ok(self.signedness.interpret(value, self.size_in_bits))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatFormat {
    #[default]
    #[serde(alias = "IEEE-754")]
    Ieee754,
    #[serde(alias = "MIL-1750A")]
    Mil1750a,
}

impl FromStr for FloatFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "IEEE-754" | "IEEE754_1985" | "IEEE754" => Ok(FloatFormat::Ieee754),
            "MIL-1750A" | "MILSTD_1750A" => Ok(FloatFormat::Mil1750a),
            other => Err(Error::InvalidSchema(format!(
                "unrecognized float encoding {other:?}"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FloatEncoding {
    size_in_bits: usize,
    format: FloatFormat,
    byte_order: ByteOrder,
    calibration: Calibration,
}

impl FloatEncoding {
    /// # Errors
    /// [Error::InvalidSchema] unless IEEE-754 is 16, 32, or 64 bits, or MIL-1750A is 32 bits.
    pub fn new(size_in_bits: usize, format: FloatFormat) -> Result<Self> {
        let valid = match format {
            FloatFormat::Ieee754 => matches!(size_in_bits, 16 | 32 | 64),
            FloatFormat::Mil1750a => size_in_bits == 32,
        };
        if !valid {
            return Err(Error::InvalidSchema(format!(
                "{size_in_bits} bit float is not valid for {format:?}"
            )));
        }
        Ok(FloatEncoding {
            size_in_bits,
            format,
            byte_order: ByteOrder::BigEndian,
            calibration: Calibration::default(),
        })
    }

    #[must_use]
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    #[must_use]
    pub fn with_calibrator(mut self, calibrator: Calibrator) -> Self {
        self.calibration.default = Some(calibrator);
        self
    }

    #[must_use]
    pub fn with_context_calibrator(mut self, context: ContextCalibrator) -> Self {
        self.calibration.context.push(context);
        self
    }

    #[must_use]
    pub fn size_in_bits(&self) -> usize {
        self.size_in_bits
    }

    #[must_use]
    pub fn format(&self) -> FloatFormat {
        self.format
    }

    /// # Errors
    /// [Error::OutOfBounds] if there is not enough data.
    pub fn read(&self, reader: &mut BitReader) -> Result<f64> {
        let mut bits = reader.read_bits_as_int(self.size_in_bits)?;
        if self.byte_order == ByteOrder::LittleEndian {
            bits = swap_bytes(bits, self.size_in_bits);
        }
        Ok(match (self.format, self.size_in_bits) {
            (FloatFormat::Mil1750a, _) => mil1750a(bits as u32),
            (_, 16) => half(bits as u16),
            (_, 32) => f64::from(f32::from_bits(bits as u32)),
            _ => f64::from_bits(bits),
        })
    }
}

/// IEEE-754 binary16.
fn half(bits: u16) -> f64 {
    let sign = if bits & 0x8000 == 0 { 1.0 } else { -1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let fraction = f64::from(bits & 0x3ff);
    match exponent {
        0 => sign * fraction * 2f64.powi(-24),
        0x1f if fraction == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + fraction / 1024.0) * 2f64.powi(exponent - 15),
    }
}

/// MIL-STD-1750A 32-bit float: 24-bit two's complement mantissa (sign included) followed
/// by an 8-bit two's complement exponent.
fn mil1750a(bits: u32) -> f64 {
    let exponent = Signedness::TwosComplement.interpret(u64::from(bits & 0xff), 8);
    let mantissa = Signedness::TwosComplement.interpret(u64::from(bits >> 8), 24);
    mantissa as f64 * 2f64.powi(exponent as i32 - 23)
}

/// `slope * x + intercept` applied to a size read from the packet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LinearAdjuster {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearAdjuster {
    #[must_use]
    pub fn new(slope: f64, intercept: f64) -> Self {
        LinearAdjuster { slope, intercept }
    }

    /// # Errors
    /// [Error::InvalidSize] if the result is not a non-negative integer.
    pub fn apply(&self, x: f64) -> Result<usize> {
        let y = self.slope * x + self.intercept;
        to_size(y).ok_or_else(|| {
            Error::InvalidSize(format!(
                "linear adjustment {}*{x}+{} = {y} is not a bit count",
                self.slope, self.intercept
            ))
        })
    }
}

fn to_size(x: f64) -> Option<usize> {
    if x.is_finite() && x >= 0.0 && x.fract() == 0.0 {
        Some(x as usize)
    } else {
        None
    }
}

/// Convert a size value to a bit count, applying `adjuster` if present.
fn resolve_size(value: &Value, adjuster: Option<&LinearAdjuster>) -> Result<usize> {
    let x = value.as_f64().ok_or_else(|| {
        Error::InvalidSize(format!("{} value {value} cannot be a size", value.type_name()))
    })?;
    match adjuster {
        Some(adj) => adj.apply(x),
        None => to_size(x)
            .ok_or_else(|| Error::InvalidSize(format!("{value} is not a bit count"))),
    }
}

fn lookup_size(
    lookups: &[DiscreteLookup],
    record: &Record,
    adjuster: Option<&LinearAdjuster>,
) -> Result<usize> {
    match first_lookup(lookups, record, None)? {
        Some(v) => resolve_size(&Value::Integer(i128::from(v)), adjuster),
        None => Err(Error::AmbiguousLength(
            "no discrete lookup matched the decoded fields".to_string(),
        )),
    }
}

fn reference_size(
    parameter: &str,
    use_calibrated: bool,
    record: &Record,
    adjuster: Option<&LinearAdjuster>,
) -> Result<usize> {
    let field = record.get(parameter).ok_or_else(|| {
        Error::ElementNotFound(format!("size reference {parameter} has not been decoded"))
    })?;
    resolve_size(field.value(use_calibrated), adjuster)
}

/// Character encoding of string values.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    UsAscii,
    Iso8859_1,
    Windows1252,
    Utf8,
    Utf16(ByteOrder),
    Utf32(ByteOrder),
}

// 0x80..=0x9f, 0 where undefined
const WINDOWS_1252_HIGH: [u16; 32] = [
    0x20ac, 0, 0x201a, 0x0192, 0x201e, 0x2026, 0x2020, 0x2021, 0x02c6, 0x2030, 0x0160, 0x2039,
    0x0152, 0, 0x017d, 0, 0, 0x2018, 0x2019, 0x201c, 0x201d, 0x2022, 0x2013, 0x2014, 0x02dc,
    0x2122, 0x0161, 0x203a, 0x0153, 0, 0x017e, 0x0178,
];

impl Charset {
    /// Look up a charset by its schema name. `UTF-16` and `UTF-32` require `byte_order`;
    /// for suffixed names it is ignored.
    ///
    /// # Errors
    /// [Error::InvalidSchema] for unknown names or a missing byte order.
    pub fn from_name(name: &str, byte_order: Option<ByteOrder>) -> Result<Self> {
        let need_order = || {
            byte_order.ok_or_else(|| {
                Error::InvalidSchema(format!("{name} strings require a byte order"))
            })
        };
        Ok(match name.to_ascii_uppercase().as_str() {
            "US-ASCII" => Charset::UsAscii,
            "ISO-8859-1" => Charset::Iso8859_1,
            "WINDOWS-1252" => Charset::Windows1252,
            "UTF-8" => Charset::Utf8,
            "UTF-16" => Charset::Utf16(need_order()?),
            "UTF-16LE" => Charset::Utf16(ByteOrder::LittleEndian),
            "UTF-16BE" => Charset::Utf16(ByteOrder::BigEndian),
            "UTF-32" => Charset::Utf32(need_order()?),
            "UTF-32LE" => Charset::Utf32(ByteOrder::LittleEndian),
            "UTF-32BE" => Charset::Utf32(ByteOrder::BigEndian),
            _ => {
                return Err(Error::InvalidSchema(format!(
                    "unsupported string encoding {name:?}"
                )))
            }
        })
    }

    /// Size in bytes of one code unit.
    #[must_use]
    pub fn unit_size(self) -> usize {
        match self {
            Charset::Utf16(_) => 2,
            Charset::Utf32(_) => 4,
            _ => 1,
        }
    }

    /// # Errors
    /// [Error::StringDecode] if `bytes` are not valid in this charset.
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        let invalid = |what: &str| Error::StringDecode(format!("{what} in {self:?} string"));
        match self {
            Charset::UsAscii => {
                if let Some(b) = bytes.iter().find(|b| !b.is_ascii()) {
                    return Err(invalid(&format!("byte 0x{b:02x}")));
                }
                Ok(bytes.iter().map(|b| char::from(*b)).collect())
            }
            Charset::Iso8859_1 => Ok(bytes.iter().map(|b| char::from(*b)).collect()),
            Charset::Windows1252 => bytes
                .iter()
                .map(|b| match b {
                    0x80..=0x9f => {
                        let cp = WINDOWS_1252_HIGH[usize::from(b - 0x80)];
                        char::from_u32(u32::from(cp))
                            .filter(|_| cp != 0)
                            .ok_or_else(|| invalid(&format!("undefined byte 0x{b:02x}")))
                    }
                    _ => Ok(char::from(*b)),
                })
                .collect(),
            Charset::Utf8 => {
                String::from_utf8(bytes.to_vec()).map_err(|e| Error::StringDecode(e.to_string()))
            }
            Charset::Utf16(order) => {
                if bytes.len() % 2 != 0 {
                    return Err(invalid("odd byte count"));
                }
                let units = bytes.chunks_exact(2).map(|c| match order {
                    ByteOrder::BigEndian => u16::from_be_bytes([c[0], c[1]]),
                    ByteOrder::LittleEndian => u16::from_le_bytes([c[0], c[1]]),
                });
                char::decode_utf16(units)
                    .collect::<std::result::Result<String, _>>()
                    .map_err(|e| Error::StringDecode(e.to_string()))
            }
            Charset::Utf32(order) => {
                if bytes.len() % 4 != 0 {
                    return Err(invalid("partial code unit"));
                }
                bytes
                    .chunks_exact(4)
                    .map(|c| {
                        let cp = match order {
                            ByteOrder::BigEndian => u32::from_be_bytes([c[0], c[1], c[2], c[3]]),
                            ByteOrder::LittleEndian => {
                                u32::from_le_bytes([c[0], c[1], c[2], c[3]])
                            }
                        };
                        char::from_u32(cp).ok_or_else(|| invalid(&format!("code point 0x{cp:x}")))
                    })
                    .collect()
            }
        }
    }
}

/// How the length of a string is determined.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum StringLength {
    /// Fixed length in bits.
    Fixed(usize),
    /// Length in bits is given by an unsigned integer of this many bits preceding the
    /// string.
    LeadingSize(usize),
    DiscreteLookup(Vec<DiscreteLookup>),
    /// Length is the value of a previously decoded parameter.
    Dynamic {
        parameter: String,
        use_calibrated: bool,
    },
    /// String ends at the first occurrence of this character, which is then skipped.
    Termination(Vec<u8>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StringEncoding {
    charset: Charset,
    length: StringLength,
    adjuster: Option<LinearAdjuster>,
}

impl StringEncoding {
    /// # Errors
    /// [Error::InvalidSchema] if a termination character is not exactly one character in
    /// `charset`.
    pub fn new(charset: Charset, length: StringLength) -> Result<Self> {
        if let StringLength::Termination(term) = &length {
            let chars = charset
                .decode(term)
                .map(|s| s.chars().count())
                .unwrap_or_default();
            if chars != 1 {
                return Err(Error::InvalidSchema(format!(
                    "termination character {term:02x?} is not a single {charset:?} character"
                )));
            }
        }
        Ok(StringEncoding {
            charset,
            length,
            adjuster: None,
        })
    }

    /// Adjust the resolved length. Not applied to terminated strings.
    #[must_use]
    pub fn with_adjuster(mut self, adjuster: LinearAdjuster) -> Self {
        self.adjuster = Some(adjuster);
        self
    }

    #[must_use]
    pub fn charset(&self) -> Charset {
        self.charset
    }

    #[must_use]
    pub fn length(&self) -> &StringLength {
        &self.length
    }

    fn size_in_bits(&self, reader: &mut BitReader, record: &Record) -> Result<usize> {
        let adjuster = self.adjuster.as_ref();
        match &self.length {
            StringLength::Fixed(bits) => match adjuster {
                Some(adj) => adj.apply(*bits as f64),
                None => Ok(*bits),
            },
            StringLength::LeadingSize(bits) => {
                let len = reader.read_bits_as_int(*bits)?;
                if len % 8 != 0 {
                    warn!(
                        length = len,
                        "leading size string length is not a whole number of bytes"
                    );
                }
                resolve_size(&Value::Integer(i128::from(len)), adjuster)
            }
            StringLength::DiscreteLookup(lookups) => lookup_size(lookups, record, adjuster),
            StringLength::Dynamic {
                parameter,
                use_calibrated,
            } => reference_size(parameter, *use_calibrated, record, adjuster),
            StringLength::Termination(term) => {
                let data = reader.peek_remaining_bytes();
                let step = self.charset.unit_size();
                (0..data.len())
                    .step_by(step)
                    .find(|i| data[*i..].starts_with(term))
                    .map(|i| i * 8)
                    .ok_or_else(|| {
                        Error::ElementNotFound(format!(
                            "termination character {term:02x?} not found before end of packet"
                        ))
                    })
            }
        }
    }

    /// # Errors
    /// Any length resolution error, [Error::OutOfBounds], or [Error::StringDecode].
    pub fn read(&self, reader: &mut BitReader, record: &Record) -> Result<String> {
        let nbits = self.size_in_bits(reader, record)?;
        let bytes = reader.read_bits_as_bytes(nbits)?;
        if let StringLength::Termination(term) = &self.length {
            reader.skip(term.len() * 8)?;
        }
        self.charset.decode(&bytes)
    }
}

/// How the length of a binary value is determined.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BinaryLength {
    Fixed(usize),
    Dynamic {
        parameter: String,
        use_calibrated: bool,
    },
    DiscreteLookup(Vec<DiscreteLookup>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BinaryEncoding {
    length: BinaryLength,
    adjuster: Option<LinearAdjuster>,
    word_size: Option<usize>,
}

impl BinaryEncoding {
    #[must_use]
    pub fn new(length: BinaryLength) -> Self {
        BinaryEncoding {
            length,
            adjuster: None,
            word_size: None,
        }
    }

    #[must_use]
    pub fn with_adjuster(mut self, adjuster: LinearAdjuster) -> Self {
        self.adjuster = Some(adjuster);
        self
    }

    /// After reading, move the cursor to the next multiple of `bits`.
    #[must_use]
    pub fn with_word_size(mut self, bits: usize) -> Self {
        self.word_size = Some(bits).filter(|b| *b > 0);
        self
    }

    #[must_use]
    pub fn length(&self) -> &BinaryLength {
        &self.length
    }

    /// # Errors
    /// Any length resolution error or [Error::OutOfBounds].
    pub fn read(&self, reader: &mut BitReader, record: &Record) -> Result<Vec<u8>> {
        let adjuster = self.adjuster.as_ref();
        let nbits = match &self.length {
            BinaryLength::Fixed(bits) => match adjuster {
                Some(adj) => adj.apply(*bits as f64)?,
                None => *bits,
            },
            BinaryLength::Dynamic {
                parameter,
                use_calibrated,
            } => reference_size(parameter, *use_calibrated, record, adjuster)?,
            BinaryLength::DiscreteLookup(lookups) => lookup_size(lookups, record, adjuster)?,
        };
        let bytes = reader.read_bits_as_bytes(nbits)?;
        if let Some(word) = self.word_size {
            let rem = reader.position() % word;
            if rem != 0 {
                debug!(word_size = word, padding = word - rem, "skipping to word boundary");
                reader.skip(word - rem)?;
            }
        }
        Ok(bytes)
    }
}

/// Bit layout of a parameter value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum DataEncoding {
    Integer(IntegerEncoding),
    Float(FloatEncoding),
    String(StringEncoding),
    Binary(BinaryEncoding),
}

impl DataEncoding {
    /// Read the raw value at the cursor.
    ///
    /// # Errors
    /// Any error from the underlying encoding.
    pub fn read(&self, reader: &mut BitReader, record: &Record) -> Result<Value> {
        Ok(match self {
            DataEncoding::Integer(e) => Value::Integer(e.read(reader)?),
            DataEncoding::Float(e) => Value::Float(e.read(reader)?),
            DataEncoding::String(e) => Value::String(e.read(reader, record)?),
            DataEncoding::Binary(e) => Value::Bytes(e.read(reader, record)?),
        })
    }

    /// Calibrators, only present for numeric encodings.
    #[must_use]
    pub fn calibration(&self) -> Option<&Calibration> {
        match self {
            DataEncoding::Integer(e) => Some(&e.calibration),
            DataEncoding::Float(e) => Some(&e.calibration),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataEncoding::Integer(_) | DataEncoding::Float(_))
    }
}

impl From<IntegerEncoding> for DataEncoding {
    fn from(e: IntegerEncoding) -> Self {
        DataEncoding::Integer(e)
    }
}

impl From<FloatEncoding> for DataEncoding {
    fn from(e: FloatEncoding) -> Self {
        DataEncoding::Float(e)
    }
}

impl From<StringEncoding> for DataEncoding {
    fn from(e: StringEncoding) -> Self {
        DataEncoding::String(e)
    }
}

impl From<BinaryEncoding> for DataEncoding {
    fn from(e: BinaryEncoding) -> Self {
        DataEncoding::Binary(e)
    }
}
