use serde_json::json;
use std::rc::Rc;
use tubbs_core::{FieldDescriptor, MemoryStore, Model, ModelError, ModelSchema};

const USER_SCHEMA: &str = r#"{
    "className": "user_account",
    "primaryKey": "id",
    "basicProperties": ["username", "email"],
    "fields": {
        "age": 1,
        "role": { "default": "member" },
        "secret": { "enumerable": false }
    }
}"#;

#[test]
fn schema_builds_a_model_equivalent_to_the_builder() {
    let from_schema = ModelSchema::from_json(USER_SCHEMA)
        .expect("schema should parse")
        .into_builder()
        .build()
        .expect("model should build");
    let from_builder = Model::builder()
        .class_name("user_account")
        .primary_key("id")
        .basic_properties(["username", "email"])
        .field(FieldDescriptor::new("age").default(json!(1)))
        .field(FieldDescriptor::new("role").default(json!("member")))
        .field(FieldDescriptor::new("secret").enumerable(false))
        .build()
        .expect("model should build");

    assert_eq!(
        from_schema.collection_name().expect("named model should have a collection"),
        "UserAccounts"
    );
    assert_eq!(from_schema.primary_key(), from_builder.primary_key());

    let mut schema_names = from_schema.field_names();
    let mut builder_names = from_builder.field_names();
    schema_names.sort_unstable();
    builder_names.sort_unstable();
    assert_eq!(schema_names, builder_names);

    assert_eq!(
        from_schema.create().to_json(),
        from_builder.create().to_json()
    );
}

#[test]
fn schema_builder_accepts_code_only_extensions() {
    let model = ModelSchema::from_json(USER_SCHEMA)
        .expect("schema should parse")
        .into_builder()
        .field(FieldDescriptor::computed("handle", |user| {
            user.get("username")
                .and_then(|name| name.as_str().map(|name| json!(format!("@{name}"))))
        }))
        .data_store(Rc::new(MemoryStore::new()))
        .build()
        .expect("model should build");

    let data = serde_json::from_value(json!({"username": "ada"}))
        .expect("test data should be a JSON object");
    let user = model.create_with(data);
    assert_eq!(user.read("handle"), Some(json!("@ada")));
}

#[test]
fn invalid_schema_field_names_fail_at_build_time() {
    let err = ModelSchema::from_json(r#"{"basicProperties": ["toJSON"]}"#)
        .expect("schema should parse")
        .into_builder()
        .build()
        .expect_err("invalid model must be rejected");
    assert_eq!(err, ModelError::ReservedFieldName("toJSON".to_string()));
}

#[test]
fn malformed_documents_are_schema_errors() {
    let err = ModelSchema::from_json(r#"{"basicProperties": "username"}"#)
        .expect_err("malformed schema must be rejected");
    assert!(matches!(err, ModelError::InvalidSchema(_)));
}
