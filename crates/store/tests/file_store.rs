use relay::{
    GroupKey, InsertOutcome, MessageId, NewRecord, RecordReader, RecordStore, RecordUpdate,
    RecordedStatus, TableName,
};
use store::FileRecordStore;

fn table() -> TableName {
    TableName::new("relay-records").unwrap()
}

fn new_record(id: &MessageId) -> NewRecord {
    NewRecord {
        id: id.clone(),
        message_id: id.clone(),
        group_id: GroupKey::new("orders").unwrap(),
        received_timestamp: 1_700_000_000_000,
        request: r#"{"path":"/health"}"#.to_string(),
    }
}

#[tokio::test]
async fn insert_then_update_yields_the_full_record() {
    let root = tempfile::tempdir().unwrap();
    let store = FileRecordStore::open(root.path(), table()).await.unwrap();
    let id = MessageId::random();

    assert_eq!(store.insert(new_record(&id)).await.unwrap(), InsertOutcome::Created);
    store
        .update(&id, RecordUpdate::backend_status(RecordedStatus::Code(404)))
        .await
        .unwrap();

    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.group_id.as_ref().map(|g| g.as_str()), Some("orders"));
    assert_eq!(record.received_timestamp, Some(1_700_000_000_000));
    assert_eq!(record.backend_response_status_code, Some(RecordedStatus::Code(404)));

    let raw = std::fs::read_to_string(store.dir().join(format!("{id}.json"))).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["backend_response_status_code"], "404");
    assert_eq!(json["message_id"], id.as_str());
}

#[tokio::test]
async fn records_survive_reopening_the_store() {
    let root = tempfile::tempdir().unwrap();
    let id = MessageId::random();
    {
        let store = FileRecordStore::open(root.path(), table()).await.unwrap();
        store.insert(new_record(&id)).await.unwrap();
    }

    let reopened = FileRecordStore::open(root.path(), table()).await.unwrap();

    assert!(reopened.get(&id).await.unwrap().is_some());
    assert_eq!(
        reopened.insert(new_record(&id)).await.unwrap(),
        InsertOutcome::AlreadyPresent
    );
}

#[tokio::test]
async fn no_temporary_files_are_left_behind() {
    let root = tempfile::tempdir().unwrap();
    let store = FileRecordStore::open(root.path(), table()).await.unwrap();
    let id = MessageId::random();

    store.insert(new_record(&id)).await.unwrap();
    store
        .update(&id, RecordUpdate::backend_status(RecordedStatus::NoResponse))
        .await
        .unwrap();

    let names: Vec<String> = std::fs::read_dir(store.dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![format!("{id}.json")]);
}

#[tokio::test]
async fn unreadable_record_is_a_serialisation_error() {
    let root = tempfile::tempdir().unwrap();
    let store = FileRecordStore::open(root.path(), table()).await.unwrap();
    let id = MessageId::new("corrupt").unwrap();
    std::fs::write(store.dir().join("corrupt.json"), "{not json").unwrap();

    let err = store.get(&id).await.unwrap_err();

    assert!(matches!(err, relay::StoreError::Serialization { .. }));
}

#[tokio::test]
async fn interrupted_writes_are_swept_on_open() {
    let root = tempfile::tempdir().unwrap();
    let id = MessageId::random();
    let dir = {
        let store = FileRecordStore::open(root.path(), table()).await.unwrap();
        store.insert(new_record(&id)).await.unwrap();
        store.dir().to_path_buf()
    };
    std::fs::write(dir.join(".5f0c1e4a.tmp"), "{\"id\":").unwrap();

    let reopened = FileRecordStore::open(root.path(), table()).await.unwrap();

    let names: Vec<String> = std::fs::read_dir(reopened.dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![format!("{id}.json")]);
    assert!(reopened.get(&id).await.unwrap().is_some());
}
