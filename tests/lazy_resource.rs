//! End-to-end lazy loading scenarios through the public client API,
//! counting requests with the in-memory transport.

use atlasclient::resource::types::{Classification, GlossaryTerm};
use atlasclient::{
    Client, ClientConfig, ClientError, EventState, FieldValue, MemoryTransport, Method, Operation,
    RawResponse, ResourceRegistry,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

const BASE: &str = "http://atlas:21000";

fn url(path: &str) -> String {
    format!("{BASE}/api/atlas/v2/{path}")
}

fn client(transport: Arc<MemoryTransport>) -> Client {
    let config = ClientConfig::builder(BASE).build().unwrap();
    Client::with_transport(config, ResourceRegistry::builtin().unwrap(), transport).unwrap()
}

fn table_entity() -> Value {
    json!({
        "entity": {
            "guid": "abc",
            "typeName": "hive_table",
            "status": "ACTIVE",
            "attributes": {"name": "orders", "owner": "bob"},
            "classifications": [{"typeName": "PII", "entityGuid": "abc"}]
        },
        "referredEntities": {}
    })
}

#[test]
fn test_initial_fields_cost_nothing() {
    let transport = Arc::new(MemoryTransport::new());
    let client = client(transport.clone());

    let mut entity = client.entity_guid("abc").unwrap();
    for _ in 0..3 {
        assert_eq!(entity.get_value("guid").unwrap(), json!("abc"));
    }
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_missing_field_costs_exactly_one_refresh() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond_json(Method::Get, &url("entity/guid/abc"), table_entity());
    let client = client(transport.clone());

    let mut entity = client.entity_guid("abc").unwrap();
    assert_eq!(entity.get_value("status").unwrap(), json!("ACTIVE"));
    assert_eq!(transport.call_count(), 1);

    for _ in 0..2 {
        let err = entity.get_value("createdBy").unwrap_err();
        assert!(matches!(err, ClientError::FieldNotFound { ref field, .. } if field == "createdBy"));
    }
    assert_eq!(transport.call_count(), 1);

    entity.refresh().unwrap();
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn test_update_round_trip_reflects_server() {
    let transport = Arc::new(MemoryTransport::new());
    let term_url = url("glossary/term/t1");
    transport
        .respond_json(Method::Get, &term_url, json!({"guid": "t1", "name": "revenue"}))
        .respond_json(Method::Get, &term_url, json!({"guid": "t1", "name": "Revenue"}));
    transport.respond(Method::Put, &term_url, RawResponse::no_content());
    let client = client(transport.clone());

    let mut term = client.glossary_term("t1").unwrap();
    assert_eq!(term.get_value("name").unwrap(), json!("revenue"));

    term.update(json!({"guid": "t1", "name": "Revenue "})).unwrap();
    assert_eq!(term.get_value("name").unwrap(), json!("Revenue"));
    assert_eq!(transport.count(Method::Get, &term_url), 2);

    let typed: GlossaryTerm = term.to_typed().unwrap();
    assert_eq!(typed.name, "Revenue");
}

#[test]
fn test_delete_blocks_further_access() {
    let transport = Arc::new(MemoryTransport::new());
    let glossary_url = url("glossary/g1");
    transport.respond(Method::Delete, &glossary_url, RawResponse::no_content());
    let client = client(transport.clone());

    let mut glossary = client.glossary("g1").unwrap();
    glossary.delete().unwrap();

    for field in ["guid", "name"] {
        assert!(matches!(
            glossary.get(field),
            Err(ClientError::DeletedResource { .. })
        ));
    }
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_search_ten_then_three() {
    let transport = Arc::new(MemoryTransport::new());
    let search_url = url("search/dsl");
    let page = |from: usize, to: usize| {
        json!({
            "queryType": "DSL",
            "queryText": "hive_table",
            "entities": (from..to).map(|i| json!({"guid": format!("e{i}")})).collect::<Vec<_>>()
        })
    };
    transport
        .respond_json(Method::Get, &search_url, page(0, 10))
        .respond_json(Method::Get, &search_url, page(10, 13));
    let client = client(transport.clone());

    let results = client
        .search_dsl("hive_table")
        .unwrap()
        .with_params([("limit", "10")])
        .unwrap();
    let guids: Vec<Value> = results
        .into_iter()
        .map(|entity| entity.unwrap().identity_key().cloned().unwrap())
        .collect();

    assert_eq!(guids.len(), 13);
    assert_eq!(guids.first(), Some(&json!("e0")));
    assert_eq!(guids.last(), Some(&json!("e12")));
    assert_eq!(transport.call_count(), 2);
    assert!(transport
        .calls()
        .iter()
        .all(|call| call.params.get("query").map(String::as_str) == Some("hive_table")));
}

#[test]
fn test_search_items_load_lazily() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond_json(
        Method::Get,
        &url("search/basic"),
        json!({"approximateCount": 1, "entities": [{"guid": "abc", "typeName": "hive_table"}]}),
    );
    transport.respond_json(Method::Get, &url("entity/guid/abc"), table_entity());
    let client = client(transport.clone());

    let mut hits: Vec<_> = client
        .search_basic(&[("typeName", "hive_table")])
        .unwrap()
        .into_iter()
        .collect::<atlasclient::Result<_>>()
        .unwrap();
    let hit = &mut hits[0];

    assert_eq!(hit.get_value("typeName").unwrap(), json!("hive_table"));
    assert_eq!(transport.call_count(), 1);

    let attributes = hit.get_value("attributes").unwrap();
    assert_eq!(attributes["owner"], json!("bob"));
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn test_relation_resolution_always_refetches() {
    let transport = Arc::new(MemoryTransport::new());
    let classifications_url = url("entity/guid/abc/classifications");
    transport.respond_json(
        Method::Get,
        &classifications_url,
        json!({"list": [{"typeName": "PII", "entityGuid": "abc"}], "totalCount": 1}),
    );
    let client = client(transport.clone());

    let mut entity = client.entity_guid("abc").unwrap();
    let FieldValue::Relation(classifications) = entity.get("classifications").unwrap() else {
        panic!("classifications should be a relation");
    };

    for _ in 0..2 {
        let mut collection = classifications.resolve().unwrap().into_collection().unwrap();
        let items = collection.fetch_all().unwrap();
        let typed: Classification =
            serde_json::from_value(Value::Object(items[0].snapshot().clone())).unwrap();
        assert_eq!(typed.type_name, "PII");
        assert_eq!(typed.entity_guid.as_deref(), Some("abc"));
    }
    assert_eq!(transport.count(Method::Get, &classifications_url), 2);
}

#[test]
fn test_preloaded_relation_from_snapshot() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond_json(Method::Get, &url("entity/guid/abc"), table_entity());
    let client = client(transport.clone());

    let mut entity = client.entity_guid("abc").unwrap();
    entity.refresh().unwrap();
    let preloaded = entity
        .relation("classifications")
        .unwrap()
        .preloaded()
        .unwrap()
        .and_then(|proxy| proxy.into_collection())
        .unwrap();

    assert_eq!(preloaded.items().len(), 1);
    assert_eq!(
        preloaded.items()[0].url().as_deref(),
        Some(url("entity/guid/abc/classification/PII").as_str())
    );
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_unknown_resource_is_rejected() {
    let client = client(Arc::new(MemoryTransport::new()));
    assert!(matches!(
        client.construct("entity_by_magic", &["abc"], None),
        Err(ClientError::UnknownResource(_))
    ));
}

#[test]
fn test_events_wrap_batch_fetches() {
    let transport = Arc::new(MemoryTransport::new());
    transport.respond_json(Method::Get, &url("glossary"), json!([]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let config = ClientConfig::builder(BASE).build().unwrap();
    let client = Client::builder(config)
        .transport(transport)
        .subscribe(None, Some(Operation::FetchBatch), None, move |event| {
            sink.lock().unwrap().push((event.resource.clone(), event.state));
        })
        .build()
        .unwrap();

    assert_eq!(client.glossaries().unwrap().into_iter().count(), 0);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("glossary".to_string(), EventState::Started),
            ("glossary".to_string(), EventState::Finished)
        ]
    );
}
