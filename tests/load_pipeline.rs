use std::collections::HashMap;
use std::time::Duration;

use mongo_json_load::execution::Cancellation;
use mongo_json_load::ingestion::{load_from_path, load_with_config, LoadRequest, LoadStage};
use mongo_json_load::store::{Fault, MemoryStore, StoreError, StoreOperation};
use mongo_json_load::{LoadConfiguration, LoadError, LoadErrorKind, LoadOptions, RawInput};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, DateTime};

fn no_env() -> HashMap<String, String> {
    HashMap::new()
}

fn config_for(input: &RawInput, options: &LoadOptions) -> LoadConfiguration {
    options.resolve(input, &no_env()).unwrap()
}

async fn load_text(
    store: &MemoryStore,
    name: &str,
    text: &str,
    options: &LoadOptions,
) -> Result<mongo_json_load::LoadReport, LoadError> {
    let input = RawInput::new(name, text);
    let config = config_for(&input, options);
    load_with_config(input, &config, store, &Cancellation::none()).await
}

async fn load_fixture(
    store: &MemoryStore,
    file: &str,
    options: &LoadOptions,
) -> Result<mongo_json_load::LoadReport, LoadError> {
    let input = RawInput::from_path(format!("tests/fixtures/{file}")).await.unwrap();
    let config = config_for(&input, options);
    load_with_config(input, &config, store, &Cancellation::none()).await
}

#[tokio::test]
async fn array_input_inserts_every_document_into_collection_named_after_source() {
    let store = MemoryStore::new();
    let report = load_text(&store, "items.json", r#"[{"a":1},{"a":2}]"#, &LoadOptions::default())
        .await
        .unwrap();

    assert_eq!(report.collection, "items");
    assert_eq!(report.inserted, 2);
    assert!(!report.dropped);

    let docs = store.documents("items");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].get_i32("a").unwrap(), 1);
    assert_eq!(docs[1].get_i32("a").unwrap(), 2);
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn dump_input_keeps_line_order() {
    let store = MemoryStore::new();
    load_text(
        &store,
        "characters.json",
        "{\"name\":\"Han\"}\n\n{\"name\":\"Leia\"}\n",
        &LoadOptions::default(),
    )
    .await
    .unwrap();

    let names: Vec<String> = store
        .documents("characters")
        .iter()
        .map(|d| d.get_str("name").unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Han", "Leia"]);
}

#[tokio::test]
async fn date_marker_is_stored_as_native_timestamp() {
    let store = MemoryStore::new();
    load_text(
        &store,
        "dates.json",
        r#"[{"when":{"$date":"1963-10-06T00:00:00.000Z"}}]"#,
        &LoadOptions::default(),
    )
    .await
    .unwrap();

    let docs = store.documents("dates");
    assert_eq!(
        docs[0].get_datetime("when").unwrap(),
        &DateTime::from_millis(-196_905_600_000)
    );
}

#[tokio::test]
async fn users_fixture_round_trip() {
    let store = MemoryStore::new();
    let report = load_fixture(&store, "users-test.json", &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(report.collection, "users-test");

    let users = store.documents("users-test");
    assert_eq!(users.len(), 5);
    assert_eq!(users[2].get_str("firstName").unwrap(), "Han");
    assert_eq!(users[4].get_str("lastName").unwrap(), "Nuts");
    assert_eq!(
        users[1].get_object_id("_id").unwrap(),
        ObjectId::parse_str("578611d17c8a27dd5b329fd5").unwrap()
    );
    // Marker key next to another key stays plain data.
    assert_eq!(
        users[4].get_document("address").unwrap(),
        &doc! { "planet": "Tatooine", "$oid": "not an identifier" }
    );
}

#[tokio::test]
async fn mongoexport_fixture_round_trip() {
    let store = MemoryStore::new();
    load_fixture(&store, "export-test.json", &LoadOptions::default())
        .await
        .unwrap();

    let objs = store.documents("export-test");
    assert_eq!(objs.len(), 3);
    assert_eq!(objs[0].get_str("first").unwrap(), "Brian");
    assert_eq!(objs[1].get_str("last").unwrap(), "Coughlin");
    assert!(objs[1].get_bool("male").unwrap());
    assert_eq!(objs[2].get_i32("appearance").unwrap(), 3);
    assert_eq!(
        objs[2].get_datetime("birthdate").unwrap(),
        &DateTime::from_millis(-196_905_600_000)
    );
    assert_eq!(
        objs[1].get_object_id("_id").unwrap(),
        ObjectId::parse_str("5787d450596cca272cab90bb").unwrap()
    );
}

#[tokio::test]
async fn mongoexport_array_fixture_decodes_nested_ids() {
    let store = MemoryStore::new();
    load_fixture(&store, "export-array-test.json", &LoadOptions::default())
        .await
        .unwrap();

    let objs = store.documents("export-array-test");
    assert_eq!(objs.len(), 2);
    assert_eq!(objs[0].get_str("name").unwrap(), "foo");
    assert_eq!(
        objs[0].get_object_id("category").unwrap(),
        ObjectId::parse_str("596a20587cc4ad065cd2cba1").unwrap()
    );
}

#[tokio::test]
async fn custom_ids_are_kept_when_coercion_is_disabled() {
    let store = MemoryStore::new();
    let opts = LoadOptions {
        coerce_identifier_strings: false,
        ..Default::default()
    };
    load_fixture(&store, "customid-test.json", &opts).await.unwrap();

    let objs = store.documents("customid-test");
    assert_eq!(
        objs[0].get("_id"),
        Some(&Bson::String("697d1942-47bc-4fc5-ac92-6e8b1dbb649f".to_string()))
    );
    assert_eq!(objs[1].get("_id"), Some(&Bson::Int32(1337)));
    assert_eq!(objs[2].get("_id"), Some(&Bson::Boolean(true)));
    assert_eq!(objs[3].get("_id"), Some(&Bson::Double(13.37)));
}

#[tokio::test]
async fn invalid_string_id_fails_before_touching_the_store() {
    let store = MemoryStore::new();
    let err = load_fixture(&store, "customid-test.json", &LoadOptions::default())
        .await
        .unwrap_err();

    match err {
        LoadError::InvalidIdentifierFormat { input, index, value } => {
            assert!(input.ends_with("customid-test.json"));
            assert_eq!(index, 0);
            assert_eq!(value, "697d1942-47bc-4fc5-ac92-6e8b1dbb649f");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.connects(), 0);
    assert!(store.collection_names().is_empty());
}

#[tokio::test]
async fn truncated_array_yields_malformed_input_and_no_mutation() {
    let store = MemoryStore::new();
    store.seed("truncated-test", vec![doc! {"keep": true}]);
    let opts = LoadOptions {
        drop_existing: true,
        ..Default::default()
    };
    let err = load_fixture(&store, "truncated-test.json", &opts)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), LoadErrorKind::MalformedInput);
    assert!(err.to_string().contains("truncated-test.json"));
    assert_eq!(store.connects(), 0);
    assert_eq!(store.count("truncated-test"), 1);
}

#[tokio::test]
async fn empty_file_is_rejected() {
    let store = MemoryStore::new();
    let err = load_fixture(&store, "empty-test.json", &LoadOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::EmptyInput);
    assert_eq!(store.connects(), 0);
}

#[tokio::test]
async fn existing_collection_is_appended_to_by_default() {
    let store = MemoryStore::new();
    store.seed("users-test", vec![doc! {"firstName": "David", "lastName": "Guetta"}]);

    load_fixture(&store, "users-test.json", &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(store.count("users-test"), 6);
}

#[tokio::test]
async fn drop_existing_replaces_collection() {
    let store = MemoryStore::new();
    store.seed("users-test", vec![doc! {"firstName": "David", "lastName": "Guetta"}]);

    let opts = LoadOptions {
        drop_existing: true,
        ..Default::default()
    };
    let report = load_fixture(&store, "users-test.json", &opts).await.unwrap();
    assert!(report.dropped);
    assert_eq!(report.inserted, 5);
    assert_eq!(store.count("users-test"), 5);
}

#[tokio::test]
async fn drop_of_missing_collection_is_not_an_error() {
    let store = MemoryStore::new();
    let opts = LoadOptions {
        drop_existing: true,
        ..Default::default()
    };
    let report = load_text(&store, "fresh.json", r#"[{"a":1}]"#, &opts).await.unwrap();
    assert!(!report.dropped);
    assert_eq!(store.count("fresh"), 1);
}

#[tokio::test]
async fn empty_array_is_a_successful_no_op() {
    let store = MemoryStore::new();
    store.inject(StoreOperation::Insert, Fault::Fail("should not be called".to_string()));
    let report = load_text(&store, "nothing.json", "[]", &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn explicit_collection_name_is_used() {
    let store = MemoryStore::new();
    let opts = LoadOptions {
        target_collection: Some("lolcats".to_string()),
        ..Default::default()
    };
    load_fixture(&store, "users-test.json", &opts).await.unwrap();
    assert_eq!(store.collection_names(), vec!["lolcats".to_string()]);
}

#[tokio::test]
async fn connection_failure_stops_the_pipeline() {
    let store = MemoryStore::new();
    let opts = LoadOptions {
        target_address: Some("postgres://localhost/nope".to_string()),
        ..Default::default()
    };
    let err = load_text(&store, "a.json", r#"[{"a":1}]"#, &opts).await.unwrap_err();
    match err {
        LoadError::Connection { address, cause, .. } => {
            assert_eq!(address, "postgres://localhost/nope");
            assert!(matches!(cause, StoreError::InvalidAddress(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.collection_names().is_empty());
}

#[tokio::test]
async fn drop_failure_reports_drop_error_and_skips_insert() {
    let store = MemoryStore::new();
    store.seed("a", vec![doc! {"old": 1}]);
    store.inject(StoreOperation::Drop, Fault::Fail("not authorized".to_string()));

    let opts = LoadOptions {
        drop_existing: true,
        ..Default::default()
    };
    let err = load_text(&store, "a.json", r#"[{"a":1}]"#, &opts).await.unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::Drop);
    assert!(err.to_string().contains("not authorized"));
    assert_eq!(store.count("a"), 1);
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn duplicate_id_keeps_partial_insert_after_drop() {
    let store = MemoryStore::new();
    store.seed("dups", vec![doc! {"old": 1}]);
    let opts = LoadOptions {
        drop_existing: true,
        ..Default::default()
    };
    let text = r#"[{"_id": 1}, {"_id": 2}, {"_id": 1}, {"_id": 3}]"#;
    let err = load_text(&store, "dups.json", text, &opts).await.unwrap_err();

    match &err {
        LoadError::Insert { collection, cause, .. } => {
            assert_eq!(collection, "dups");
            assert!(matches!(cause, StoreError::DuplicateKey { inserted: 2, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Old document gone, first two new ones written; nothing is rolled back.
    let ids: Vec<Bson> = store
        .documents("dups")
        .iter()
        .map(|d| d.get("_id").cloned().unwrap())
        .collect();
    assert_eq!(ids, vec![Bson::Int32(1), Bson::Int32(2)]);
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn cancelling_a_stalled_insert_releases_the_connection() {
    let store = MemoryStore::new();
    store.inject(StoreOperation::Insert, Fault::Stall);

    let input = RawInput::new("slow.json", r#"[{"a":1}]"#);
    let config = config_for(&input, &LoadOptions::default());
    let (handle, cancel) = Cancellation::channel();

    let load = load_with_config(input, &config, &store, &cancel);
    let trigger = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    };
    let (result, ()) = tokio::join!(load, trigger);

    match result.unwrap_err() {
        LoadError::Cancelled { input, stage } => {
            assert_eq!(input, "slow.json");
            assert_eq!(stage, LoadStage::Inserting);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn timeout_during_connect_is_reported_as_cancelled() {
    let store = MemoryStore::new();
    store.inject(StoreOperation::Connect, Fault::Stall);

    let input = RawInput::new("slow.json", r#"[{"a":1}]"#);
    let config = config_for(&input, &LoadOptions::default());
    let cancel = Cancellation::none().with_timeout(Duration::from_millis(100));

    let err = load_with_config(input, &config, &store, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::Cancelled {
            stage: LoadStage::Connecting,
            ..
        }
    ));
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn already_cancelled_signal_never_connects() {
    let store = MemoryStore::new();
    let (handle, cancel) = Cancellation::channel();
    handle.cancel();

    let err = load_text_with_cancel(&store, &cancel).await.unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::Cancelled);
    assert_eq!(store.connects(), 0);
}

async fn load_text_with_cancel(
    store: &MemoryStore,
    cancel: &Cancellation,
) -> Result<mongo_json_load::LoadReport, LoadError> {
    let input = RawInput::new("x.json", r#"[{"a":1}]"#);
    let config = config_for(&input, &LoadOptions::default());
    load_with_config(input, &config, store, cancel).await
}

#[tokio::test]
async fn independent_inputs_load_concurrently() {
    let store = MemoryStore::new();
    let opts = LoadOptions::default();

    let (users, addresses) = tokio::join!(
        load_fixture(&store, "users-test.json", &opts),
        load_fixture(&store, "addresses-test.json", &opts),
    );
    assert_eq!(users.unwrap().inserted, 5);
    assert_eq!(addresses.unwrap().inserted, 2);

    assert_eq!(
        store.collection_names(),
        vec!["addresses-test".to_string(), "users-test".to_string()]
    );
    assert_eq!(store.connects(), 2);
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn load_request_reads_from_disk() {
    let store = MemoryStore::new();
    let request = LoadRequest::new(
        "tests/fixtures/addresses-test.json",
        LoadOptions {
            target_address: Some("mongodb://localhost/fixtures".to_string()),
            ..Default::default()
        },
    );
    let report = request.run(&store, &Cancellation::none()).await.unwrap();
    assert_eq!(report.collection, "addresses-test");
    assert_eq!(store.count("addresses-test"), 2);
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let store = MemoryStore::new();
    let err = load_from_path(
        "tests/fixtures/does_not_exist.json",
        &LoadOptions::default(),
        &store,
        &Cancellation::none(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::Io);
    assert_eq!(err.input(), Some("tests/fixtures/does_not_exist.json"));
    assert!(err.to_string().contains("does_not_exist.json"));
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn cancelling_a_stalled_drop_leaves_the_collection_alone() {
    let store = MemoryStore::new();
    store.seed("slow", vec![doc! {"keep": 1}, doc! {"keep": 2}]);
    store.inject(StoreOperation::Drop, Fault::Stall);

    let input = RawInput::new("slow.json", r#"[{"a":1}]"#);
    let opts = LoadOptions {
        drop_existing: true,
        ..Default::default()
    };
    let config = config_for(&input, &opts);
    let cancel = Cancellation::none().with_timeout(Duration::from_millis(100));

    let err = load_with_config(input, &config, &store, &cancel)
        .await
        .unwrap_err();
    match err {
        LoadError::Cancelled { input, stage } => {
            assert_eq!(input, "slow.json");
            assert_eq!(stage, LoadStage::Dropping);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.count("slow"), 2);
    assert_eq!(store.open_connections(), 0);
}

fn large_dump(rows: usize) -> String {
    let mut out = String::with_capacity(rows * 64);
    for i in 0..rows {
        out.push_str(&format!(
            "{{\"n\":{i},\"at\":{{\"$date\":\"2016-07-13T12:00:00.000Z\"}}}}\n"
        ));
    }
    out
}

#[tokio::test(flavor = "current_thread")]
async fn large_batch_does_not_block_other_loads_on_one_thread() {
    let big_store = MemoryStore::new();
    let small_store = MemoryStore::new();
    let finished = std::sync::Mutex::new(Vec::new());
    let cancel = Cancellation::none().with_timeout(Duration::from_secs(60));

    let big = async {
        let input = RawInput::new("big.json", large_dump(100_000));
        let config = config_for(&input, &LoadOptions::default());
        let report = load_with_config(input, &config, &big_store, &cancel).await;
        finished.lock().unwrap().push("big");
        report
    };
    let small = async {
        let input = RawInput::new("small.json", r#"[{"a":1}]"#);
        let config = config_for(&input, &LoadOptions::default());
        let report = load_with_config(input, &config, &small_store, &cancel).await;
        finished.lock().unwrap().push("small");
        report
    };
    let (big, small) = tokio::join!(big, small);

    assert_eq!(big.unwrap().inserted, 100_000);
    assert_eq!(small.unwrap().inserted, 1);
    assert_eq!(*finished.lock().unwrap(), vec!["small", "big"]);
}
