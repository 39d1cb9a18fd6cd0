//! Tests for schema values and fingerprints.

use super::*;

fn point_schema() -> StructSchema {
    StructSchema::new(vec![
        Field::new("y", Schema::Int32),
        Field::new("x", Schema::Int32),
        Field::new("label", Schema::String),
    ])
}

#[test]
fn wire_order_is_sorted_by_snake_case_name() {
    let schema = point_schema();
    let wire_names: Vec<&str> = schema
        .sorted_fields()
        .map(|(_, f)| f.name.as_str())
        .collect();
    assert_eq!(wire_names, ["label", "x", "y"]);
    // Declaration order is untouched.
    assert_eq!(schema.field_index("y"), Some(0));
    assert_eq!(schema.field_index("label"), Some(2));
}

#[test]
fn snake_case_lowers_camel_humps() {
    assert_eq!(snake_case("FieldName"), "field_name");
    assert_eq!(snake_case("innerValue"), "inner_value");
    assert_eq!(snake_case("already_snake"), "already_snake");
    assert_eq!(snake_case("F1"), "f1");
}

#[test]
fn fingerprint_ignores_declaration_order() {
    let a = StructSchema::new(vec![
        Field::new("a", Schema::Int32),
        Field::new("b", Schema::String),
    ]);
    let b = StructSchema::new(vec![
        Field::new("b", Schema::String),
        Field::new("a", Schema::Int32),
    ]);
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn fingerprint_distinguishes_field_types() {
    let a = StructSchema::new(vec![Field::new("a", Schema::Int32)]);
    let b = StructSchema::new(vec![Field::new("a", Schema::Int64)]);
    assert_ne!(a.fingerprint(), b.fingerprint());
}

#[test]
fn fingerprint_skips_dynamic_fields() {
    let with_dynamic = StructSchema::new(vec![
        Field::new("a", Schema::Int32),
        Field::new("extra", Schema::Dynamic),
    ]);
    let without = StructSchema::new(vec![Field::new("a", Schema::Int32)]);
    assert_eq!(with_dynamic.fingerprint(), without.fingerprint());
}

#[test]
fn fingerprint_of_self_referential_schema_terminates() {
    let schema = StructSchema::new(vec![
        Field::new("next", Schema::Named("example.Node".to_owned())),
        Field::new("payload", Schema::Int64),
    ]);
    assert!(schema.fingerprint() >= 0);
}

#[test]
fn named_key_splits_on_last_dot() {
    assert_eq!(
        TypeKey::named("org.example.Foo"),
        TypeKey::Named {
            namespace: "org.example".to_owned(),
            name: "Foo".to_owned()
        }
    );
    assert_eq!(
        TypeKey::named("Bare"),
        TypeKey::Named { namespace: String::new(), name: "Bare".to_owned() }
    );
    assert_eq!(TypeKey::named("org.example.Foo").path(), "org.example.Foo");
}

#[test]
fn referencable_splits_heap_from_primitive() {
    assert!(Schema::String.referencable());
    assert!(Schema::List(Box::new(Schema::Int32)).referencable());
    assert!(Schema::Named("x.Y".to_owned()).referencable());
    assert!(Schema::Dynamic.referencable());
    assert!(!Schema::Int32.referencable());
    assert!(!Schema::Timestamp.referencable());
}
