#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Schema generation against the `TripPin` reference service metadata.

use odata_edm::{
    EndpointGroup, FieldType, endpoints_from_metadata, models_from_metadata, parse_metadata,
};

const TRIPPIN: &str = include_str!("fixtures/trippin.xml");

#[test]
fn models_cover_every_set_and_singleton() {
    let edmx = parse_metadata(TRIPPIN).unwrap();
    let models = models_from_metadata("trippin", &edmx).unwrap();

    let names: Vec<_> = models.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        ["People", "Airlines", "Airports", "NewComePeople", "Employees", "Me"]
    );
    assert!(models.values().all(|m| m.connector == "trippin"));
}

#[test]
fn client_assigned_keys_get_shadow_fields() {
    let edmx = parse_metadata(TRIPPIN).unwrap();
    let models = models_from_metadata("trippin", &edmx).unwrap();

    for model in models.values() {
        let key = model.primary_key();
        let shadow = format!("{key}ID");
        assert!(!model.fields.contains_key(key), "{} exposes its key", model.name);
        assert_eq!(model.shadow_key(), Some(shadow.as_str()));
        assert!(model.metadata.primarykey.is_none());

        let field = &model.fields[&shadow];
        assert_eq!(field.field_type, model.key.field_type);
        assert!(!field.required);
    }
}

#[test]
fn person_fields_resolve_through_the_type_table() {
    let edmx = parse_metadata(TRIPPIN).unwrap();
    let models = models_from_metadata("trippin", &edmx).unwrap();
    let people = &models["People"];

    assert_eq!(people.entity_type, "Trippin.Person");
    assert_eq!(people.key.field_type, FieldType::String);

    let ty = |name: &str| people.fields[name].field_type;
    assert_eq!(ty("FirstName"), FieldType::String);
    assert_eq!(ty("Gender"), FieldType::String);
    assert_eq!(ty("Age"), FieldType::Number);
    assert_eq!(ty("Emails"), FieldType::Array);
    assert_eq!(ty("HomeAddress"), FieldType::Object);
    assert!(people.fields["FirstName"].required);
    assert!(!people.fields["LastName"].required);

    let order: Vec<_> = people.fields.keys().map(String::as_str).collect();
    assert_eq!(order.last(), Some(&"Trips"));
    assert_eq!(order.iter().position(|f| *f == "UserNameID"), Some(10));
}

#[test]
fn navigation_fields_point_at_pluralized_models() {
    let edmx = parse_metadata(TRIPPIN).unwrap();
    let models = models_from_metadata("trippin", &edmx).unwrap();
    let people = &models["People"];

    let best = &people.fields["BestFriend"];
    assert_eq!(best.model.as_deref(), Some("People"));
    assert_eq!(best.field_type, FieldType::String);
    assert!(!best.required);

    assert_eq!(people.fields["Friends"].field_type, FieldType::Array);
    assert_eq!(people.ref_model("Friends"), Some("People"));
    assert_eq!(people.ref_model("Trips"), Some("Trips"));
    assert!(people.ref_model("FirstName").is_none());
    assert!(people.has_ref_fields());
    assert!(!models["Airlines"].has_ref_fields());
}

#[test]
fn derived_entity_inherits_key_and_properties() {
    let edmx = parse_metadata(TRIPPIN).unwrap();
    let models = models_from_metadata("trippin", &edmx).unwrap();
    let employees = &models["Employees"];

    assert_eq!(employees.entity_type, "Trippin.Employee");
    assert_eq!(employees.primary_key(), "UserName");
    assert!(employees.fields.contains_key("FirstName"));
    assert!(employees.fields["Cost"].required);
    assert_eq!(employees.ref_model("Peers"), Some("People"));
    assert_eq!(employees.ref_model("BestFriend"), Some("People"));
}

#[test]
fn singleton_is_read_only() {
    let edmx = parse_metadata(TRIPPIN).unwrap();
    let models = models_from_metadata("trippin", &edmx).unwrap();
    let me = &models["Me"];

    assert!(me.is_singleton());
    for action in ["findByID", "findAll", "count", "distinct"] {
        assert!(!me.allows(action), "{action}");
    }
    assert!(!models["People"].is_singleton());
}

#[test]
fn endpoints_for_imports() {
    let edmx = parse_metadata(TRIPPIN).unwrap();
    let endpoints = endpoints_from_metadata("trippin", &edmx);
    assert_eq!(endpoints.len(), 3);

    let nearest = endpoints
        .iter()
        .find(|e| e.name == "GetNearestAirport")
        .unwrap();
    assert_eq!(nearest.group, EndpointGroup::Functions);
    assert_eq!(nearest.path, "/api/getnearestairport/:lat/:lon");
    assert_eq!(nearest.model.as_deref(), Some("Airports"));
    assert_eq!(nearest.function, "Trippin.GetNearestAirport");
    assert!(!nearest.return_collection);
    let params = nearest.parameters.as_ref().unwrap();
    assert_eq!(params["lat"].param_type, FieldType::Number);

    let reset = endpoints
        .iter()
        .find(|e| e.name == "ResetDataSource")
        .unwrap();
    assert_eq!(reset.group, EndpointGroup::Actions);
    assert!(reset.parameters.is_none());
    assert_eq!(reset.path, "/api/resetdatasource");
}

#[test]
fn serialized_models_use_wire_names() {
    let edmx = parse_metadata(TRIPPIN).unwrap();
    let models = models_from_metadata("trippin", &edmx).unwrap();
    let json = serde_json::to_value(&models).unwrap();

    assert_eq!(
        json["People"]["metadata"]["appc.odata"]["primarykey"],
        "UserNameID"
    );
    assert_eq!(json["Me"]["disabledActions"][0], "findByID");
    assert_eq!(json["People"]["fields"]["Age"]["type"], "number");
}
