mod common;

use std::sync::Arc;

use test_case::test_case;
use xtce::criteria::{
    Anded, BooleanExpression, Comparison, Condition, DiscreteLookup, MatchCriteria, Operand,
    Operator,
};
use xtce::encoding::{Charset, StringEncoding, StringLength};
use xtce::framing::{create_ccsds_packet, PrimaryHeader};
use xtce::schema::RepeatCount;
use xtce::{
    decode, Decoder, Error, Parameter, ParameterEntry, ParameterType, Schema, SequenceContainer,
    TypeKind, Value,
};

use common::{ccsds_root, uint};

fn eq(param: &str, value: &str) -> MatchCriteria {
    Comparison::new(param, Operator::Eq, value).raw().into()
}

fn conditional_schema() -> Schema {
    let container = SequenceContainer::builder()
        .name("Conditional")
        .entries(vec![
            uint("Mode", 8).into(),
            uint("Flag", 8).into(),
            ParameterEntry::new(uint("OptionalData1", 16))
                .include_if(eq("Mode", "1"))
                .into(),
            ParameterEntry::new(uint("OptionalData2", 16))
                .include_if(eq("Flag", "1"))
                .into(),
            uint("Mandatory", 32).into(),
        ])
        .build();
    Schema::build([container]).unwrap()
}

#[test]
fn conditional_entries_skipped_without_moving_cursor() {
    let schema = conditional_schema();
    let dat = hex::decode("000000000378").unwrap();

    let record = decode(&dat, &schema, "Conditional").unwrap();

    assert_eq!(record.raw("Mandatory"), Some(&Value::Integer(888)));
    assert!(!record.contains("OptionalData1"));
    assert!(!record.contains("OptionalData2"));
    assert_eq!(record.bits_consumed(), 48);
    assert_eq!(
        record.names().collect::<Vec<_>>(),
        vec!["Mode", "Flag", "Mandatory"]
    );
}

#[test]
fn conditional_entries_included() {
    let schema = conditional_schema();
    let dat = hex::decode("01010005000600000378").unwrap();

    let record = decode(&dat, &schema, "Conditional").unwrap();

    assert_eq!(record.raw("OptionalData1"), Some(&Value::Integer(5)));
    assert_eq!(record.raw("OptionalData2"), Some(&Value::Integer(6)));
    assert_eq!(record.raw("Mandatory"), Some(&Value::Integer(888)));
    assert_eq!(record.bits_consumed(), 80);
}

#[test]
fn include_condition_requires_all_criteria() {
    let container = SequenceContainer::builder()
        .name("Root")
        .entries(vec![
            uint("A", 8).into(),
            uint("B", 8).into(),
            ParameterEntry::new(uint("BOTH", 8))
                .include_if(eq("A", "1"))
                .include_if(eq("B", "1"))
                .into(),
        ])
        .build();
    let schema = Schema::build([container]).unwrap();

    let record = decode(&[1, 1, 7], &schema, "Root").unwrap();
    assert_eq!(record.raw("BOTH"), Some(&Value::Integer(7)));

    let record = decode(&[1, 0], &schema, "Root").unwrap();
    assert!(!record.contains("BOTH"));
}

fn discriminated_schema(root_abstract: bool, a: MatchCriteria, b: MatchCriteria) -> Schema {
    let root = SequenceContainer::builder()
        .name("Root")
        .entries(vec![uint("DISC", 8).into()])
        .is_abstract(root_abstract)
        .build();
    let a = SequenceContainer::builder()
        .name("A")
        .base_container("Root")
        .restriction_criteria(vec![a])
        .entries(vec![uint("A_DATA", 8).into()])
        .build();
    let b = SequenceContainer::builder()
        .name("B")
        .base_container("Root")
        .restriction_criteria(vec![b])
        .entries(vec![uint("B_DATA", 16).into()])
        .build();
    Schema::build([root, a, b]).unwrap()
}

#[test_case(&[1, 9], Some("A_DATA"); "selects A")]
#[test_case(&[2, 0, 9], Some("B_DATA"); "selects B")]
#[test_case(&[3], None; "neither stops at root")]
fn inheritance_is_deterministic(dat: &[u8], expected: Option<&str>) {
    let schema = discriminated_schema(false, eq("DISC", "1"), eq("DISC", "2"));

    let record = decode(dat, &schema, "Root").unwrap();

    assert_eq!(record.raw("A_DATA").is_some(), expected == Some("A_DATA"));
    assert_eq!(record.raw("B_DATA").is_some(), expected == Some("B_DATA"));
    assert_eq!(record.bits_consumed(), dat.len() * 8);
}

#[test]
fn ambiguous_inheritance_fails_with_partial_record() {
    let schema = discriminated_schema(
        false,
        Comparison::new("DISC", Operator::Ge, "1").into(),
        Comparison::new("DISC", Operator::Le, "5").into(),
    );

    let err = decode(&[2, 0, 0], &schema, "Root").unwrap_err();

    match err {
        Error::UnrecognizedPacketType { message, partial } => {
            assert!(message.contains('A') && message.contains('B'), "{message}");
            assert_eq!(partial.raw("DISC"), Some(&Value::Integer(2)));
            assert_eq!(partial.bits_consumed(), 8);
        }
        other => panic!("expected UnrecognizedPacketType, got {other:?}"),
    }
}

#[test]
fn abstract_container_without_match_fails() {
    let schema = discriminated_schema(true, eq("DISC", "1"), eq("DISC", "2"));

    assert!(matches!(
        decode(&[3], &schema, "Root"),
        Err(Error::UnrecognizedPacketType { .. })
    ));
}

#[test]
fn custom_algorithm_restriction_fails_fast() {
    let schema = discriminated_schema(
        false,
        MatchCriteria::CustomAlgorithm("algo".into()),
        eq("DISC", "2"),
    );
    assert!(matches!(
        decode(&[1, 0], &schema, "Root"),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn boolean_expression_restriction() {
    let anded = BooleanExpression::And(Anded {
        conditions: vec![
            Condition::new("DISC", Operator::Gt, Operand::Literal("10".into())),
            Condition::new("DISC", Operator::Lt, Operand::Literal("20".into())),
        ],
        ors: vec![],
    });
    let schema = discriminated_schema(false, anded.into(), eq("DISC", "0"));

    let record = decode(&[15, 1], &schema, "Root").unwrap();
    assert_eq!(record.raw("A_DATA"), Some(&Value::Integer(1)));

    let record = decode(&[25], &schema, "Root").unwrap();
    assert_eq!(record.len(), 1);
}

fn ccsds_schema() -> Schema {
    let hk = SequenceContainer::builder()
        .name("Housekeeping")
        .base_container("CCSDSPacket")
        .restriction_criteria(vec![eq("PKT_APID", "100")])
        .entries(vec![uint("HK_ID", 8).into()])
        .build();
    let hk_power = SequenceContainer::builder()
        .name("HousekeepingPower")
        .base_container("Housekeeping")
        .restriction_criteria(vec![eq("HK_ID", "1")])
        .entries(vec![uint("VOLTAGE", 16).into(), uint("CURRENT", 16).into()])
        .build();
    let science = SequenceContainer::builder()
        .name("Science")
        .base_container("CCSDSPacket")
        .restriction_criteria(vec![eq("PKT_APID", "200")])
        .entries(vec![uint("COUNTS", 32).into()])
        .build();
    Schema::build([ccsds_root(), hk, hk_power, science]).unwrap()
}

#[test]
fn ccsds_multi_level_inheritance() {
    let schema = ccsds_schema();
    let header = PrimaryHeader::builder()
        .apid(100)
        .sequence_count(42)
        .build();
    let packet = create_ccsds_packet(&header, &[1, 0x00, 0x1c, 0x00, 0x03]).unwrap();

    let record = Decoder::default().decode(&schema, &packet).unwrap();

    let header_names: Vec<&str> = record.header().map(|f| f.name.as_str()).collect();
    assert_eq!(
        header_names,
        vec!["VERSION", "TYPE", "SEC_HDR_FLG", "PKT_APID", "SEQ_FLGS", "SRC_SEQ_CTR", "PKT_LEN"]
    );
    assert_eq!(record.raw("PKT_APID"), Some(&Value::Integer(100)));
    assert_eq!(record.raw("SEQ_FLGS"), Some(&Value::Integer(3)));
    assert_eq!(record.raw("SRC_SEQ_CTR"), Some(&Value::Integer(42)));
    assert_eq!(record.raw("PKT_LEN"), Some(&Value::Integer(4)));
    assert_eq!(record.raw("VOLTAGE"), Some(&Value::Integer(28)));
    assert_eq!(record.raw("CURRENT"), Some(&Value::Integer(3)));
    assert_eq!(record.user_data().len(), 3);
    assert!(!record.contains("COUNTS"));
}

#[test]
fn ccsds_unknown_apid_is_unrecognized() {
    let schema = ccsds_schema();
    let packet = create_ccsds_packet(&PrimaryHeader::builder().apid(300).build(), &[0]).unwrap();

    let err = Decoder::default().decode(&schema, &packet).unwrap_err();

    match err {
        Error::UnrecognizedPacketType { partial, .. } => assert_eq!(partial.len(), 7),
        other => panic!("expected UnrecognizedPacketType, got {other:?}"),
    }
}

#[test]
fn records_keep_packet_bytes() {
    let schema = ccsds_schema();
    let packet = create_ccsds_packet(&PrimaryHeader::builder().apid(200).build(), &[0, 0, 0, 5])
        .unwrap();

    let record = Decoder::default().decode(&schema, &packet).unwrap();
    assert_eq!(record.binary_data(), &packet[..]);

    let unknown = create_ccsds_packet(&PrimaryHeader::builder().apid(300).build(), &[9]).unwrap();
    match Decoder::default().decode(&schema, &unknown) {
        Err(Error::UnrecognizedPacketType { partial, .. }) => {
            assert_eq!(partial.binary_data(), &unknown[..]);
        }
        other => panic!("expected UnrecognizedPacketType, got {other:?}"),
    }
}

#[test]
fn length_mismatch_is_a_warning_unless_strict() {
    let schema = ccsds_schema();
    let packet = create_ccsds_packet(&PrimaryHeader::builder().apid(200).build(), &[0, 0, 0, 5, 0xff])
        .unwrap();

    let record = Decoder::default().decode(&schema, &packet).unwrap();
    assert_eq!(record.raw("COUNTS"), Some(&Value::Integer(5)));
    assert_eq!(record.bits_consumed(), (packet.len() - 1) * 8);

    let strict = Decoder::builder().strict_length(true).build();
    assert!(matches!(
        strict.decode(&schema, &packet),
        Err(Error::InvalidSize(_))
    ));
}

#[test]
fn short_packet_is_out_of_bounds() {
    let schema = ccsds_schema();
    let mut packet =
        create_ccsds_packet(&PrimaryHeader::builder().apid(200).build(), &[0, 0, 0, 5]).unwrap();
    packet.truncate(8);

    assert!(matches!(
        Decoder::default().decode(&schema, &packet),
        Err(Error::OutOfBounds { .. })
    ));
}

#[test]
fn missing_root_container() {
    let schema = ccsds_schema();
    assert!(matches!(
        decode(&[0u8; 8], &schema, "NoSuchRoot"),
        Err(Error::ElementNotFound(_))
    ));
}

#[test]
fn repeated_entry_unsupported() {
    let container = SequenceContainer::builder()
        .name("Root")
        .entries(vec![ParameterEntry::new(uint("R", 8))
            .repeated(RepeatCount::Fixed(2))
            .into()])
        .build();
    let schema = Schema::build([container]).unwrap();

    assert!(matches!(
        decode(&[1, 2], &schema, "Root"),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn nested_container_decoded_inline() {
    let inner = Arc::new(
        SequenceContainer::builder()
            .name("Inner")
            .entries(vec![uint("X", 4).into(), uint("Y", 4).into()])
            .build(),
    );
    let outer = SequenceContainer::builder()
        .name("Outer")
        .entries(vec![uint("FIRST", 8).into(), inner.into(), uint("LAST", 8).into()])
        .build();
    let schema = Schema::build([outer]).unwrap();
    assert!(schema.container("Inner").is_some());

    let record = decode(&[0xaa, 0x12, 0xbb], &schema, "Outer").unwrap();

    assert_eq!(
        record.names().collect::<Vec<_>>(),
        vec!["FIRST", "X", "Y", "LAST"]
    );
    assert_eq!(record.raw("Y"), Some(&Value::Integer(2)));
    assert_eq!(record.raw("LAST"), Some(&Value::Integer(0xbb)));
}

#[test]
fn string_length_from_discrete_lookup() {
    let ptype = ParameterType::builder()
        .name("NAME_Type")
        .kind(TypeKind::String)
        .encoding(
            StringEncoding::new(
                Charset::UsAscii,
                StringLength::DiscreteLookup(vec![
                    DiscreteLookup {
                        comparisons: vec![Comparison::new("KIND", Operator::Eq, "1").raw()],
                        value: 16,
                    },
                    DiscreteLookup {
                        comparisons: vec![Comparison::new("KIND", Operator::Eq, "2").raw()],
                        value: 32,
                    },
                ]),
            )
            .unwrap(),
        )
        .build();
    let name = Arc::new(Parameter::builder().name("NAME").parameter_type(ptype).build());
    let container = SequenceContainer::builder()
        .name("Root")
        .entries(vec![uint("KIND", 8).into(), name.into()])
        .build();
    let schema = Schema::build([container]).unwrap();

    let record = decode(b"\x02abcd", &schema, "Root").unwrap();
    assert_eq!(record.derived("NAME"), Some(&Value::String("abcd".into())));

    assert!(matches!(
        decode(b"\x03abcd", &schema, "Root"),
        Err(Error::AmbiguousLength(_))
    ));
}

#[test]
fn record_json() {
    let schema = conditional_schema();
    let record = decode(&hex::decode("000000000378").unwrap(), &schema, "Conditional").unwrap();

    assert_eq!(
        record.to_json(),
        serde_json::json!({"Mode": 0, "Flag": 0, "Mandatory": 888})
    );
}

#[test]
fn schema_uniqueness() {
    let a = SequenceContainer::builder()
        .name("Dup")
        .entries(vec![uint("P", 8).into()])
        .build();
    let identical = a.clone();
    let different = SequenceContainer::builder()
        .name("Dup")
        .entries(vec![uint("P", 8).into(), uint("Q", 8).into()])
        .build();

    let schema = Schema::build([a.clone(), identical]).unwrap();
    assert_eq!(schema.containers().count(), 1);

    assert!(matches!(
        Schema::build([a, different]),
        Err(Error::DuplicateDefinition { .. })
    ));
}

#[test]
fn container_serde_round_trip() {
    let root = ccsds_root();
    let json = serde_json::to_string(&root).unwrap();
    let back: SequenceContainer = serde_json::from_str(&json).unwrap();
    assert_eq!(back, root);
}
