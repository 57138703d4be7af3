#![allow(dead_code)]

use std::sync::Arc;

use xtce::encoding::{IntegerEncoding, Signedness};
use xtce::{Entry, Parameter, ParameterType, SequenceContainer};

pub fn uint_type(name: &str, bits: usize) -> ParameterType {
    ParameterType::builder()
        .name(name)
        .encoding(IntegerEncoding::new(bits, Signedness::Unsigned).unwrap())
        .build()
}

pub fn uint(name: &str, bits: usize) -> Arc<Parameter> {
    Arc::new(
        Parameter::builder()
            .name(name)
            .parameter_type(uint_type(&format!("UINT{bits}"), bits))
            .build(),
    )
}

/// The seven CCSDS primary header fields.
pub fn ccsds_header_entries() -> Vec<Entry> {
    vec![
        uint("VERSION", 3).into(),
        uint("TYPE", 1).into(),
        uint("SEC_HDR_FLG", 1).into(),
        uint("PKT_APID", 11).into(),
        uint("SEQ_FLGS", 2).into(),
        uint("SRC_SEQ_CTR", 14).into(),
        uint("PKT_LEN", 16).into(),
    ]
}

/// Abstract `CCSDSPacket` root container holding the primary header.
pub fn ccsds_root() -> SequenceContainer {
    SequenceContainer::builder()
        .name("CCSDSPacket")
        .entries(ccsds_header_entries())
        .is_abstract(true)
        .build()
}
