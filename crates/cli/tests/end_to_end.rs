use std::time::Duration;

use relay::{QueueName, TableName};
use serde_json::{json, Value};
use webhook_relay::config::BackendTarget;
use webhook_relay::{start, RelayConfig, RunningRelay};

fn config() -> RelayConfig {
    let local = "127.0.0.1:0".parse().unwrap();
    RelayConfig {
        ingress_addr: local,
        admin_addr: local,
        backend: BackendTarget::Faux,
        queue_name: QueueName::new("relay.fifo").unwrap(),
        table_name: TableName::new("relay-records").unwrap(),
        store_dir: None,
        group_by_field: None,
        pool_size: 2,
        invocation_timeout: Duration::from_secs(3),
        backend_timeout: Duration::from_secs(1),
        redelivery_delay: Duration::from_millis(50),
        dedup_window: Duration::from_secs(300),
        max_receive_count: None,
        faux_backend_addr: Some(local),
        otlp_endpoint: None,
        log_level: "info".to_string(),
    }
}

async fn post(relay: &RunningRelay, path_and_query: &str, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{}{}", relay.ingress_addr(), path_and_query))
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

/// Polls the admin surface until the record for `id` satisfies `done`.
async fn record_eventually(
    relay: &RunningRelay,
    id: &str,
    done: impl Fn(&Value) -> bool,
) -> Value {
    let client = reqwest::Client::new();
    let url = format!("http://{}/records/{id}", relay.admin_addr());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let response = client.get(&url).send().await.unwrap();
        if response.status().is_success() {
            let record: Value = response.json().await.unwrap();
            if done(&record) {
                return record;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "record {id} did not reach the expected state"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn status_is(expected: &'static str) -> impl Fn(&Value) -> bool {
    move |record| record["backend_response_status_code"] == expected
}

fn test_rig_body() -> Value {
    json!({"order_id": "123456", "suppress_sentry": true, "consume_bad_messages": true})
}

#[tokio::test]
async fn health_post_is_relayed_and_recorded() {
    let relay = start(config()).await.unwrap();

    let (status, body) = post(&relay, "/health", test_rig_body()).await;
    assert_eq!(status, 200);
    let id = body["message_id"].as_str().unwrap().to_string();

    let record = record_eventually(&relay, &id, status_is("200")).await;
    let request: Value = serde_json::from_str(record["request"].as_str().unwrap()).unwrap();
    assert_eq!(request["path"], "/health");
    assert_eq!(request["httpMethod"], "POST");
    assert_eq!(record["message_id"], id.as_str());
    assert_eq!(record["group_id"], "grouping-disabled");

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn query_parameters_are_preserved() {
    let relay = start(config()).await.unwrap();

    let (_, body) = post(&relay, "/health?hello=world", test_rig_body()).await;
    let id = body["message_id"].as_str().unwrap().to_string();

    let record = record_eventually(&relay, &id, status_is("200")).await;
    let request: Value = serde_json::from_str(record["request"].as_str().unwrap()).unwrap();
    assert_eq!(request["queryStringParameters"], json!({"hello": "world"}));

    let received = relay.faux_backend().unwrap().received();
    assert_eq!(received[0].path, "/health");
    assert_eq!(received[0].query.as_deref(), Some("hello=world"));

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn consumable_404_is_recorded_and_acknowledged() {
    let relay = start(config()).await.unwrap();
    let mut body = test_rig_body();
    body["faux_backend_force_status_code"] = json!("404");

    let (_, answer) = post(&relay, "/health", body).await;
    let id = answer["message_id"].as_str().unwrap().to_string();

    record_eventually(&relay, &id, status_is("404")).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !relay.queue().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "message acknowledged");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(relay.faux_backend().unwrap().received().len(), 1);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn backend_500_is_recorded_and_redelivered() {
    let relay = start(config()).await.unwrap();
    let body = json!({
        "order_id": "123456",
        "suppress_sentry": true,
        "faux_backend_force_status_code": "500"
    });

    let (_, answer) = post(&relay, "/health", body).await;
    let id = answer["message_id"].as_str().unwrap().to_string();

    record_eventually(&relay, &id, status_is("500")).await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while relay.faux_backend().unwrap().received().len() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "message redelivered");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(relay.queue().len(), 1);

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn body_field_grouping_rejects_calls_without_the_field() {
    let relay = start(RelayConfig {
        group_by_field: Some("order_id".to_string()),
        ..config()
    })
    .await
    .unwrap();

    let (status, body) = post(
        &relay,
        "/",
        json!({"this_should": "fail", "suppress_sentry": true}),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["msg"], "Unable to determine MessageGroupId");
    assert!(relay.queue().is_empty());

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn file_store_keeps_records_on_disk() {
    let root = tempfile::tempdir().unwrap();
    let relay = start(RelayConfig {
        store_dir: Some(root.path().to_path_buf()),
        ..config()
    })
    .await
    .unwrap();

    let (_, answer) = post(&relay, "/health", test_rig_body()).await;
    let id = answer["message_id"].as_str().unwrap().to_string();
    record_eventually(&relay, &id, status_is("200")).await;

    let path = root.path().join("relay-records").join(format!("{id}.json"));
    let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(on_disk["backend_response_status_code"], "200");

    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_record_is_404_on_the_admin_surface() {
    let relay = start(config()).await.unwrap();

    let response = reqwest::get(format!("http://{}/records/missing", relay.admin_addr()))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn accepted_message_survives_a_restart() {
    let root = tempfile::tempdir().unwrap();
    let durable = || RelayConfig {
        store_dir: Some(root.path().to_path_buf()),
        ..config()
    };
    let body = json!({
        "order_id": "123456",
        "suppress_sentry": true,
        "faux_backend_force_status_code": "500"
    });

    let relay = start(durable()).await.unwrap();
    let (_, answer) = post(&relay, "/health", body).await;
    let id = answer["message_id"].as_str().unwrap().to_string();
    record_eventually(&relay, &id, status_is("500")).await;
    relay.shutdown().await.unwrap();

    let restarted = start(durable()).await.unwrap();
    assert_eq!(restarted.queue().len(), 1);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while restarted.faux_backend().unwrap().received().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "message redelivered after restart");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let received = restarted.faux_backend().unwrap().received();
    assert_eq!(received[0].path, "/health");

    restarted.shutdown().await.unwrap();
}
