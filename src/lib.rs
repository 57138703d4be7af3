#![doc = include_str!("../README.md")]

mod error;

pub mod bits;
pub mod calibrate;
pub mod criteria;
pub mod decode;
pub mod encoding;
pub mod framing;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;

pub use decode::{decode, Decoder, DEFAULT_ROOT};
pub use error::{Error, Result};
pub use record::{Field, Record};
pub use schema::{
    build_schema, Entry, Parameter, ParameterEntry, Schema, SequenceContainer,
};
pub use types::{ParameterType, TypeKind};
pub use value::Value;
