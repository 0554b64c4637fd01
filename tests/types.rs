use chrono::{DateTime, Utc};
use uuid::Uuid;

use ogma::testing::{MemoryGraph, StaticTypesGuard};
use ogma::{
    register_static_type, AttributeDef, AttributeKind, Error, Object, Storage, TypeDef, Value,
};

fn new_store() -> Storage<MemoryGraph> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut store = Storage::new(MemoryGraph::new());
    store.initialize().unwrap();
    store
}

#[test]
fn dynamic_types_are_local_to_their_store() {
    let mut store = new_store();
    store
        .register_dynamic_type(
            TypeDef::new("Foobar")
                .base("Entity")
                .attribute("id", AttributeDef::new(AttributeKind::Str).unique()),
        )
        .unwrap();

    let foobar = store.instantiate("Foobar", [("id", "spam")]).unwrap();
    store.save(&Object::Instance(foobar)).unwrap();
    assert!(store.get("Foobar", &[("id", Value::from("spam"))]).unwrap().is_some());

    // another store never learned about Foobar
    let other = new_store();
    let err = other.instantiate("Foobar", [("id", "spam")]).unwrap_err();
    assert!(matches!(err, Error::UnknownType(id) if id == "Foobar"));
}

#[test]
fn registering_the_same_dynamic_type_twice_fails() {
    let mut store = new_store();
    store.register_dynamic_type(TypeDef::new("Once").base("Entity")).unwrap();
    let err = store.register_dynamic_type(TypeDef::new("Once").base("Entity")).unwrap_err();
    assert!(matches!(err, Error::TypeAlreadyRegistered(id) if id == "Once"));
}

#[test]
fn static_types_are_visible_to_every_store_until_rolled_back() {
    let type_id = "StaticTracked";
    {
        let _guard = StaticTypesGuard::new();
        register_static_type(
            TypeDef::new(type_id)
                .base("Entity")
                .attribute("id", AttributeDef::new(AttributeKind::Str).unique()),
        )
        .unwrap();

        let mut store = new_store();
        let instance = store.instantiate(type_id, [("id", "s1")]).unwrap();
        store.save(&Object::Instance(instance)).unwrap();
        assert!(store.get(type_id, &[("id", Value::from("s1"))]).unwrap().is_some());

        let second = new_store();
        assert!(second.instantiate(type_id, [("id", "s2")]).is_ok());
    }

    // the guard rolled the registration back
    let store = new_store();
    let err = store.instantiate(type_id, [("id", "s3")]).unwrap_err();
    assert!(matches!(err, Error::UnknownType(_)));
}

#[test]
fn custom_attribute_kinds_store_like_their_base() {
    let mut store = new_store();
    store.register_dynamic_type(TypeDef::new("Score").base("Integer")).unwrap();

    let score_kind = AttributeKind::custom("Score", AttributeKind::Int).unwrap();
    store
        .register_dynamic_type(
            TypeDef::new("Player")
                .base("Entity")
                .attribute("id", AttributeDef::new(AttributeKind::Str).unique())
                .attribute("score", AttributeDef::new(score_kind).default(0i64)),
        )
        .unwrap();

    let player = store
        .instantiate("Player", [("id", Value::from("p1")), ("score", Value::from(42i64))])
        .unwrap();
    store.save(&Object::Instance(player)).unwrap();

    let found = store.get("Player", &[("id", Value::from("p1"))]).unwrap().unwrap();
    match found {
        Object::Instance(found) => assert_eq!(found.get("score"), Some(&Value::Int(42))),
        other => panic!("expected the player back, got {other:?}"),
    }

    // the declared default applies when the attribute is unset
    let fresh = store.instantiate("Player", [("id", "p2")]).unwrap();
    assert_eq!(fresh.get("score"), Some(&Value::Int(0)));
}

#[test]
fn uuid_and_datetime_attributes_survive_the_round_trip() {
    let mut store = new_store();
    store
        .register_dynamic_type(
            TypeDef::new("Event")
                .base("Entity")
                .attribute("id", AttributeDef::new(AttributeKind::Str).unique())
                .attribute("token", AttributeDef::new(AttributeKind::Uuid))
                .attribute("at", AttributeDef::new(AttributeKind::DateTime)),
        )
        .unwrap();

    let token = Uuid::parse_str("3b29a175-9fc9-47b9-b3ee-8a0d8e63276c").unwrap();
    let at: DateTime<Utc> = DateTime::parse_from_rfc3339("2014-03-01T12:30:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let event = store
        .instantiate(
            "Event",
            [
                ("id", Value::from("e1")),
                ("token", Value::from(token)),
                ("at", Value::from(at)),
            ],
        )
        .unwrap();
    store.save(&Object::Instance(event.clone())).unwrap();

    let found = store.get("Event", &[("id", Value::from("e1"))]).unwrap().unwrap();
    match found {
        Object::Instance(found) => {
            assert_eq!(found.get("token"), Some(&Value::Uuid(token)));
            assert_eq!(found.get("at"), Some(&Value::DateTime(at)));
            assert_eq!(found, event);
        }
        other => panic!("expected the event back, got {other:?}"),
    }
}

#[test]
fn mismatched_attribute_values_are_rejected_at_save() {
    let mut store = new_store();
    store
        .register_dynamic_type(
            TypeDef::new("Counter")
                .base("Entity")
                .attribute("id", AttributeDef::new(AttributeKind::Str).unique())
                .attribute("count", AttributeDef::new(AttributeKind::Int)),
        )
        .unwrap();

    let mut counter = ogma::Instance::new("Counter");
    counter.set("id", "c1");
    counter.set("count", "not a number");

    let err = store.save(&Object::Instance(counter)).unwrap_err();
    assert!(matches!(err, Error::Encode { .. }));
}
