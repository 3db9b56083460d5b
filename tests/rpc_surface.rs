//! RPC surface regression: the pair-list protocol over real HTTP.
//!
//! Every response must carry `status ∈ {"ok","error"}`; engine failures are
//! envelopes, never HTTP errors or panics.

use serde_json::{json, Value};

use batcom::api::{create_router, EngineHandle};

async fn spawn_server() -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let handle = EngineHandle::new(dir.path().to_path_buf());
    let router = create_router(handle);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), dir)
}

fn status_of(body: &Value) -> &str {
    body.as_array()
        .and_then(|pairs| {
            pairs.iter().find_map(|pair| {
                let pair = pair.as_array()?;
                (pair[0] == "status").then(|| pair[1].as_str())?
            })
        })
        .unwrap_or("missing")
}

fn field_of<'a>(body: &'a Value, key: &str) -> Option<&'a Value> {
    body.as_array()?.iter().find_map(|pair| {
        let pair = pair.as_array()?;
        (pair[0] == key).then(|| &pair[1])
    })
}

async fn rpc(client: &reqwest::Client, base: &str, function: &str, body: Value) -> Value {
    client
        .post(format!("{base}/rpc/{function}"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Init record that needs no credentials: local provider, explicit endpoint.
fn init_record() -> Value {
    json!([
        ["ai", [
            ["provider", "local"],
            ["endpoint", "http://127.0.0.1:9/v1"],
            ["model", "test-model"]
        ]]
    ])
}

#[tokio::test]
async fn lifecycle_round_trip() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    // Uninitialized: op calls return error envelopes, never HTTP failures
    let body = rpc(&client, &base, "get_pending_commands", json!([])).await;
    assert_eq!(status_of(&body), "error");

    let body = rpc(&client, &base, "is_initialized", json!([])).await;
    assert_eq!(status_of(&body), "ok");
    assert_eq!(field_of(&body, "initialized"), Some(&json!(false)));

    let body = rpc(&client, &base, "init", init_record()).await;
    assert_eq!(status_of(&body), "ok", "init failed: {body}");
    assert!(field_of(&body, "version").is_some());

    let body = rpc(&client, &base, "is_initialized", json!([])).await;
    assert_eq!(field_of(&body, "initialized"), Some(&json!(true)));

    let body = rpc(&client, &base, "get_token_stats", json!([])).await;
    assert_eq!(status_of(&body), "ok");
    let stats = field_of(&body, "stats").unwrap();
    assert_eq!(stats["lifetime"]["calls"], 0);

    let body = rpc(&client, &base, "shutdown", json!([])).await;
    assert_eq!(status_of(&body), "ok");
    let body = rpc(&client, &base, "is_initialized", json!([])).await;
    assert_eq!(field_of(&body, "initialized"), Some(&json!(false)));
}

#[tokio::test]
async fn snapshot_and_admin_errors_are_envelopes() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();
    rpc(&client, &base, "init", init_record()).await;

    // Malformed snapshot: dropped with an error status, engine stays up
    let body = rpc(&client, &base, "world_snapshot", json!([["groups", 7]])).await;
    assert_eq!(status_of(&body), "error");
    assert!(field_of(&body, "error")
        .and_then(Value::as_str)
        .unwrap()
        .contains("bad snapshot"));

    // Valid snapshot afterwards is accepted
    let body = rpc(
        &client,
        &base,
        "world_snapshot",
        json!([["mission_time", 5.0]]),
    )
    .await;
    assert_eq!(status_of(&body), "ok");

    // Unknown admin command
    let body = rpc(
        &client,
        &base,
        "admin_command",
        json!([["name", "selfDestruct"], ["params", []]]),
    )
    .await;
    assert_eq!(status_of(&body), "error");

    // Admin misuse: end an AO that never started
    let body = rpc(
        &client,
        &base,
        "admin_command",
        json!([["name", "commanderEndAO"], ["params", []]]),
    )
    .await;
    assert_eq!(status_of(&body), "error");
    assert!(field_of(&body, "error")
        .and_then(Value::as_str)
        .unwrap()
        .contains("no AO is running"));
}

#[tokio::test]
async fn admin_configuration_flows() {
    let (base, _dir) = spawn_server().await;
    let client = reqwest::Client::new();
    rpc(&client, &base, "init", init_record()).await;

    let body = rpc(
        &client,
        &base,
        "admin_command",
        json!([["name", "commanderSides"], ["params", [["sides", ["OPFOR"]]]]]),
    )
    .await;
    assert_eq!(status_of(&body), "ok");

    let body = rpc(
        &client,
        &base,
        "admin_command",
        json!([["name", "list_resource_templates"], ["params", []]]),
    )
    .await;
    assert_eq!(status_of(&body), "ok");
    let templates = field_of(&body, "templates").unwrap().as_array().unwrap();
    assert!(templates.iter().any(|t| t == "combined_arms"));

    let body = rpc(
        &client,
        &base,
        "admin_command",
        json!([
            ["name", "load_resource_template"],
            ["params", [["template", "light_garrison"], ["side", "EAST"]]]
        ]),
    )
    .await;
    assert_eq!(status_of(&body), "ok");

    let body = rpc(
        &client,
        &base,
        "admin_command",
        json!([
            ["name", "setLLMConfig"],
            ["params", [["min_interval", 45.0], ["model", "other-model"]]]
        ]),
    )
    .await;
    assert_eq!(status_of(&body), "ok");
    assert_eq!(field_of(&body, "model"), Some(&json!("other-model")));

    let body = rpc(
        &client,
        &base,
        "admin_command",
        json!([
            ["name", "set_ao_defense_phase"],
            ["params", [["active", true]]]
        ]),
    )
    .await;
    assert_eq!(status_of(&body), "ok");
    assert_eq!(field_of(&body, "active"), Some(&json!(true)));
}
