//! Whole-codec round-trip scenarios.

use std::rc::Rc;

use crate::codec::{Codec, CodecBuilder};
use crate::error::Error;
use crate::schema::{Field, Schema, StructSchema, TypeKey};
use crate::value::{StructValue, Value};
use crate::Buffer;

fn codecs_both_modes() -> [Codec; 2] {
    [
        CodecBuilder::new().with_reference_tracking(true).build(),
        CodecBuilder::new().with_reference_tracking(false).build(),
    ]
}

fn round_trip(codec: &mut Codec, value: &Value) -> Value {
    let bytes = codec.serialize(value).unwrap();
    codec.deserialize(&bytes).unwrap()
}

fn assert_round_trips(codec: &mut Codec, value: &Value) {
    let decoded = round_trip(codec, value);
    assert_eq!(&decoded, value, "round trip of {value}");
}

#[test]
fn primitives_round_trip() {
    let values = [
        Value::Bool(false),
        Value::Bool(true),
        Value::Int8(i8::MIN),
        Value::Int8(-1),
        Value::Int8(i8::MAX),
        Value::Int16(i16::MIN),
        Value::Int16(i16::MAX),
        Value::Int32(i32::MIN),
        Value::Int32(-1),
        Value::Int32(1),
        Value::Int32(i32::MAX),
        Value::Int64(i64::MIN),
        Value::Int64(-1),
        Value::Int64(i64::MAX),
        Value::Float32(-1.0),
        Value::Float32(1.5),
        Value::Float64(-1.0),
        Value::Float64(1.0),
        Value::string("str"),
        Value::string(""),
        Value::Date(19_000),
        Value::Timestamp(1_700_000_000_000_000),
    ];
    for codec in &mut codecs_both_modes() {
        for value in &values {
            assert_round_trips(codec, value);
        }
    }
}

#[test]
fn typed_arrays_round_trip() {
    let values = [
        Value::BoolArray(Rc::new(vec![false, true, true])),
        Value::Int8Array(Rc::new(vec![i8::MIN, -1, 0, 1, i8::MAX])),
        Value::Int16Array(Rc::new(vec![i16::MIN, -1, 0, 1, i16::MAX])),
        Value::Int32Array(Rc::new(vec![i32::MIN, -1, 0, 1, i32::MAX])),
        Value::Int64Array(Rc::new(vec![i64::MIN, -1, 0, 1, i64::MAX])),
        Value::Float32Array(Rc::new(vec![-1.0, 0.0, 1.0])),
        Value::Float64Array(Rc::new(vec![-1.0, 0.0, 1.0])),
        Value::binary((0..=255).collect()),
    ];
    for codec in &mut codecs_both_modes() {
        for value in &values {
            assert_round_trips(codec, value);
        }
    }
}

#[test]
fn collections_round_trip() {
    let values = [
        Value::list(vec![]),
        Value::list(vec![Value::Int32(1), Value::Int32(2)]),
        Value::list(vec![
            Value::string("str1"),
            Value::string(""),
            Value::string("str2"),
        ]),
        Value::list(vec![Value::Null, Value::Int32(5), Value::Null]),
        Value::set(vec![]),
        Value::set(vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]),
        Value::map_from_pairs(vec![]),
        Value::map_from_pairs(vec![
            (Value::string("k1"), Value::Int32(1)),
            (Value::string("k2"), Value::Int32(-1)),
            (Value::string("str"), Value::Int32(2)),
            (Value::string(""), Value::Int32(3)),
        ]),
        Value::map_from_pairs(vec![
            (Value::string("k1"), Value::string("v1")),
            (Value::string("k2"), Value::list(vec![Value::Bool(true)])),
            (Value::string("k3"), Value::Null),
        ]),
    ];
    for codec in &mut codecs_both_modes() {
        for value in &values {
            assert_round_trips(codec, value);
        }
    }
}

#[test]
fn heterogeneous_list_renders_like_peers() {
    let mut codec = Codec::new();
    let list = Value::list(vec![
        Value::Bool(true),
        Value::Bool(false),
        Value::string("str"),
        Value::Float64(-1.1),
        Value::Int32(1),
        Value::Int32Array(Rc::new(vec![0; 5])),
        Value::Float64Array(Rc::new(vec![0.0; 5])),
    ]);
    let decoded = round_trip(&mut codec, &list);
    assert_eq!(
        decoded.to_string(),
        "[true false str -1.1 1 [0 0 0 0 0] [0 0 0 0 0]]"
    );
}

#[test]
fn repeated_strings_collapse_to_back_references() {
    let mut codec = Codec::new();
    let payload = Value::String(Rc::new("x".repeat(1000)));
    let list =
        Value::list(vec![payload.clone(), payload.clone(), payload.clone()]);

    let bytes = codec.serialize(&list).unwrap();
    assert!(bytes.len() < 2 * 1000, "encoded {} bytes", bytes.len());

    let decoded = codec.deserialize(&bytes).unwrap();
    let elements = decoded.as_list().unwrap().borrow();
    assert_eq!(elements[0], payload);
    assert!(elements[0].same_identity(&elements[1]));
    assert!(elements[1].same_identity(&elements[2]));
}

#[test]
fn aliased_collections_share_identity_after_decode() {
    let mut codec = Codec::new();
    let shared = Value::list(vec![Value::Int32(1), Value::Int32(2)]);
    let outer = Value::list(vec![shared.clone(), shared]);

    let decoded = round_trip(&mut codec, &outer);
    let elements = decoded.as_list().unwrap().borrow();
    assert!(elements[0].same_identity(&elements[1]));

    // Mutating through one alias is visible through the other.
    elements[0]
        .as_list()
        .unwrap()
        .borrow_mut()
        .push(Value::Int32(3));
    assert_eq!(elements[1].as_list().unwrap().borrow().len(), 3);
}

#[test]
fn equal_boxed_primitives_share_identity_after_decode() {
    let mut codec = Codec::new();
    let list = Value::list(vec![
        Value::Int64(42),
        Value::string("spacer"),
        Value::Int64(42),
    ]);
    let bytes = codec.serialize(&list).unwrap();
    let with_sharing = bytes.len();

    let distinct = Value::list(vec![
        Value::Int64(42),
        Value::string("spacer"),
        Value::Int64(43),
    ]);
    let bytes_distinct = codec.serialize(&distinct).unwrap();
    // The repeated 42 travels as a back-reference, not a second payload.
    assert!(with_sharing < bytes_distinct.len());
    assert_eq!(codec.deserialize(&bytes).unwrap(), list);
}

#[test]
fn self_referential_map_decodes_to_one_instance() {
    let mut codec = Codec::new();
    let map = Value::map_from_pairs(vec![]);
    if let Value::Map(cell) = &map {
        cell.borrow_mut().insert(Value::string("me"), map.clone());
    }

    let bytes = codec.serialize(&map).unwrap();
    let decoded = codec.deserialize(&bytes).unwrap();
    let inner = decoded
        .as_map()
        .unwrap()
        .borrow()
        .get(&Value::string("me"))
        .cloned()
        .unwrap();
    assert!(decoded.same_identity(&inner));
}

fn register_node(codec: &mut Codec) {
    codec
        .register_named_type(
            "example",
            "Node",
            StructSchema::new(vec![Field::new(
                "next",
                Schema::Named("example.Node".to_owned()),
            )]),
        )
        .unwrap();
}

#[test]
fn self_referential_struct_decodes_to_one_instance() {
    let mut codec = Codec::new();
    register_node(&mut codec);

    let node = Value::structure(StructValue::new(
        TypeKey::named("example.Node"),
        vec![Value::Null],
    ));
    if let Value::Struct(cell) = &node {
        cell.borrow_mut().fields[0] = node.clone();
    }

    let decoded = round_trip(&mut codec, &node);
    let next = decoded.as_struct().unwrap().borrow().fields[0].clone();
    assert!(decoded.same_identity(&next));
}

fn register_graph_types(codec: &mut Codec) {
    codec
        .register_named_type(
            "example",
            "A",
            StructSchema::new(vec![
                Field::new("f1", Schema::String),
                Field::new("f2", Schema::Named("example.A".to_owned())),
                Field::new("f3", Schema::Named("example.A".to_owned())),
            ]),
        )
        .unwrap();
    codec
        .register_named_type(
            "example",
            "B",
            StructSchema::new(vec![
                Field::new("f1", Schema::List(Box::new(Schema::String))),
                Field::new(
                    "f2",
                    Schema::Map(
                        Box::new(Schema::String),
                        Box::new(Schema::Int32),
                    ),
                ),
                Field::new("f3", Schema::Named("example.A".to_owned())),
                Field::new("f4", Schema::Named("example.B".to_owned())),
            ]),
        )
        .unwrap();
}

#[test]
fn cross_referenced_graph_preserves_every_alias() {
    let mut codec = Codec::new();
    register_graph_types(&mut codec);

    let a = Value::structure(StructValue::new(
        TypeKey::named("example.A"),
        vec![Value::string("str"), Value::Null, Value::Null],
    ));
    if let Value::Struct(cell) = &a {
        cell.borrow_mut().fields[1] = a.clone();
        cell.borrow_mut().fields[2] = a.clone();
    }
    let str1 = Value::string("str1");
    let empty = Value::string("");
    let b = Value::structure(StructValue::new(
        TypeKey::named("example.B"),
        vec![
            Value::list(vec![
                str1.clone(),
                str1,
                empty.clone(),
                empty,
                Value::string("str2"),
            ]),
            Value::map_from_pairs(vec![
                (Value::string("k1"), Value::Int32(1)),
                (Value::string("k2"), Value::Int32(-1)),
                (Value::string("str"), Value::Int32(2)),
                (Value::string(""), Value::Int32(3)),
            ]),
            a.clone(),
            Value::Null,
        ],
    ));
    if let Value::Struct(cell) = &b {
        cell.borrow_mut().fields[3] = b.clone();
    }
    let value = Value::list(vec![b.clone(), b.clone()]);

    let decoded = round_trip(&mut codec, &value);
    let list = decoded.as_list().unwrap().borrow();
    assert!(list[0].same_identity(&list[1]));

    let b0 = list[0].as_struct().unwrap().borrow();
    assert!(list[0].same_identity(&b0.fields[3]));

    let a0 = b0.fields[2].clone();
    let a_fields = a0.as_struct().unwrap().borrow();
    assert!(a0.same_identity(&a_fields.fields[1]));
    assert!(a0.same_identity(&a_fields.fields[2]));
    assert_eq!(a_fields.fields[0], Value::string("str"));

    let f1 = b0.fields[0].as_list().unwrap().borrow();
    assert_eq!(f1.len(), 5);
    assert_eq!(f1[0], Value::string("str1"));
    assert!(f1[0].same_identity(&f1[1]));
}

#[test]
fn structs_round_trip_across_field_shapes() {
    for codec in &mut codecs_both_modes() {
        codec
            .register_named_type(
                "example",
                "Record",
                StructSchema::new(vec![
                    Field::new("flag", Schema::Bool),
                    Field::new("count", Schema::Int64),
                    Field::new("ratio", Schema::Float64),
                    Field::new("label", Schema::String),
                    Field::new("payload", Schema::Binary),
                    Field::new("when", Schema::Timestamp),
                    Field::new(
                        "tags",
                        Schema::List(Box::new(Schema::String)),
                    ),
                    Field::new(
                        "scores",
                        Schema::Map(
                            Box::new(Schema::String),
                            Box::new(Schema::Int32),
                        ),
                    ),
                    Field::new("extra", Schema::Dynamic),
                ]),
            )
            .unwrap();

        let record = Value::structure(StructValue::new(
            TypeKey::named("example.Record"),
            vec![
                Value::Bool(true),
                Value::Int64(-7),
                Value::Float64(0.25),
                Value::string("record"),
                Value::binary(vec![1, 2, 3]),
                Value::Timestamp(1_000_000),
                Value::list(vec![Value::string("x"), Value::string("y")]),
                Value::map_from_pairs(vec![(
                    Value::string("k"),
                    Value::Int32(9),
                )]),
                Value::set(vec![Value::Int32(5)]),
            ],
        ));
        assert_round_trips(codec, &record);

        // Null in every nullable slot.
        let sparse = Value::structure(StructValue::new(
            TypeKey::named("example.Record"),
            vec![
                Value::Bool(false),
                Value::Int64(0),
                Value::Float64(0.0),
                Value::Null,
                Value::Null,
                Value::Timestamp(0),
                Value::Null,
                Value::Null,
                Value::Null,
            ],
        ));
        assert_round_trips(codec, &sparse);
    }
}

#[test]
fn id_registered_structs_round_trip() {
    let mut codec = Codec::new();
    codec
        .register_type_id(
            12,
            StructSchema::new(vec![
                Field::new("x", Schema::Int32),
                Field::new("y", Schema::Int32),
            ]),
        )
        .unwrap();
    let point = Value::structure(StructValue::new(
        TypeKey::Id(12),
        vec![Value::Int32(3), Value::Int32(-4)],
    ));
    assert_round_trips(&mut codec, &point);
}

#[test]
fn schema_fingerprint_mismatch_rejects_the_frame() {
    let mut writer = Codec::new();
    writer
        .register_named_type(
            "example",
            "Evolved",
            StructSchema::new(vec![Field::new("a", Schema::Int32)]),
        )
        .unwrap();
    let value = Value::structure(StructValue::new(
        TypeKey::named("example.Evolved"),
        vec![Value::Int32(1)],
    ));
    let bytes = writer.serialize(&value).unwrap();

    let mut reader = Codec::new();
    reader
        .register_named_type(
            "example",
            "Evolved",
            StructSchema::new(vec![Field::new("a", Schema::Int64)]),
        )
        .unwrap();
    assert!(matches!(
        reader.deserialize(&bytes),
        Err(Error::HashMismatch { .. })
    ));
}

#[test]
fn maps_with_nulls_keep_chunking() {
    let mut codec = Codec::new();
    let mut pairs: Vec<(Value, Value)> = (0..300)
        .map(|i| (Value::Int32(i), Value::string(format!("v{i}"))))
        .collect();
    pairs[150].1 = Value::Null;
    pairs.push((Value::Null, Value::string("keyless")));
    let map = Value::map_from_pairs(pairs);

    assert_round_trips(&mut codec, &map);
}

#[test]
fn nested_dynamic_graphs_round_trip() {
    let mut codec = Codec::new();
    let inner_list = Value::list(vec![
        Value::Bool(true),
        Value::string("str"),
        Value::Float64(-1.1),
    ]);
    let dict = Value::map_from_pairs(vec![
        (Value::string("k1"), Value::string("v1")),
        (Value::string("k2"), inner_list.clone()),
        (Value::string("k3"), Value::Int32(-1)),
    ]);
    let decoded = round_trip(&mut codec, &dict);
    assert_eq!(decoded, dict);

    let decoded_inner = decoded
        .as_map()
        .unwrap()
        .borrow()
        .get(&Value::string("k2"))
        .cloned()
        .unwrap();
    assert_eq!(decoded_inner, inner_list);
}

#[test]
fn out_of_band_payloads_travel_beside_the_stream() {
    use std::cell::RefCell;

    let mut codec = Codec::new();
    let value = Value::list(vec![
        Value::string("str"),
        Value::binary(vec![0u8; 1000]),
    ]);

    let collected: Rc<RefCell<Vec<Buffer>>> = Rc::new(RefCell::new(vec![]));
    let sink = collected.clone();
    let mut buf = Buffer::new();
    codec
        .serialize_into(
            &mut buf,
            &value,
            Some(Box::new(move |object| {
                sink.borrow_mut().push(object.to_buffer());
                false
            })),
        )
        .unwrap();

    let buffers = Rc::try_unwrap(collected).unwrap().into_inner();
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers[0].written().len(), 1000);
    // The stream itself carries only the exclusion marker.
    assert!(buf.written().len() < 100);

    let mut read_buf = Buffer::from_bytes(buf.written());
    let decoded =
        codec.deserialize_from(&mut read_buf, Some(buffers)).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn in_band_binary_still_round_trips_without_callback() {
    let mut codec = Codec::new();
    let value = Value::list(vec![
        Value::string("str"),
        Value::binary(vec![7u8; 64]),
    ]);
    assert_round_trips(&mut codec, &value);
}

#[test]
fn untracked_mode_rejects_nothing_but_shares_nothing() {
    let mut codec = CodecBuilder::new().with_reference_tracking(false).build();
    let shared = Value::list(vec![Value::Int32(1)]);
    let outer = Value::list(vec![shared.clone(), shared]);
    let decoded = round_trip(&mut codec, &outer);
    let elements = decoded.as_list().unwrap().borrow();
    assert_eq!(elements[0], elements[1]);
    assert!(!elements[0].same_identity(&elements[1]));
}
