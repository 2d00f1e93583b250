use nova_config::json_schema;

#[test]
fn json_schema_describes_stop_policy() {
    let schema = json_schema();
    let value = serde_json::to_value(schema).expect("schema serializes");

    let stop_policy = value
        .pointer("/definitions/DebuggerConfig/properties/stop_policy")
        .expect("stop_policy schema property exists");
    assert!(stop_policy.is_object(), "{stop_policy}");
    assert!(
        value.pointer("/definitions/StopPolicy").is_some(),
        "expected StopPolicy definition: {value}"
    );
}
