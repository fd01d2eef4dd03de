use continental_web::server::{AppContext, WebServer};
use serde_json::{json, Value};
use std::time::Duration;
use warp::hyper::body::HttpBody;
use warp::hyper::{self, Body, Client as HyperClient, Request};

type Client = HyperClient<hyper::client::HttpConnector>;

async fn send(client: &Client, method: hyper::Method, uri: String, body: Option<Value>) -> (hyper::StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(hyper::header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let request = builder.body(body).expect("build request");
    let response = client.request(request).await.expect("issue request");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse json body")
    };
    (status, json)
}

async fn read_until(body: &mut Body, needle: &str) -> String {
    let mut seen = String::new();
    while !seen.contains(needle) {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.data())
            .await
            .unwrap_or_else(|_| panic!("no `{needle}` within timeout, saw: {seen}"))
            .expect("stream still open")
            .expect("read chunk");
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    seen
}

#[tokio::test]
async fn table_api_lifecycle() {
    let server = WebServer::from_context(AppContext::new_for_tests());
    let handle = server.start().await.expect("start server");
    let address = handle.address();
    let client = HyperClient::new();

    tokio::time::sleep(Duration::from_millis(20)).await;

    let (status, created) = send(
        &client,
        hyper::Method::POST,
        format!("http://{address}/api/tables"),
        Some(json!({ "seed": 42, "capacity": 2, "strategy": "exhaustive" })),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CREATED);
    let table_id = created["table_id"].as_str().expect("table id").to_string();
    assert_eq!(created["config"]["seed"], 42);
    assert_eq!(created["config"]["strategy"], "exhaustive");
    assert_eq!(created["state"]["phase"], "lobby");

    let players = format!("http://{address}/api/tables/{table_id}/players");
    for name in ["alice", "bob"] {
        let (status, joined) = send(
            &client,
            hyper::Method::POST,
            players.clone(),
            Some(json!({ "player_id": name })),
        )
        .await;
        assert_eq!(status, hyper::StatusCode::CREATED);
        assert_eq!(joined["player_id"], name);
    }
    let (status, full) = send(
        &client,
        hyper::Method::POST,
        players.clone(),
        Some(json!({ "player_id": "carol" })),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CONFLICT);
    assert_eq!(full["error"], "game_full");

    let events_uri: hyper::Uri = format!("http://{address}/api/tables/{table_id}/players/bob/events")
        .parse()
        .expect("parse events uri");
    let stream_response = client.get(events_uri).await.expect("open event stream");
    assert_eq!(stream_response.status(), hyper::StatusCode::OK);
    let content_type = stream_response
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));
    let mut stream = stream_response.into_body();
    let first = read_until(&mut stream, "\n\n").await;
    assert!(first.contains("event:updateGameState"));

    let alice_actions = format!("http://{address}/api/tables/{table_id}/players/alice/actions");
    let bob_actions = format!("http://{address}/api/tables/{table_id}/players/bob/actions");

    let (status, started) = send(
        &client,
        hyper::Method::POST,
        alice_actions.clone(),
        Some(json!({ "type": "startRound" })),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert!(started["events"]
        .as_array()
        .expect("event names")
        .iter()
        .any(|e| e == "newRound"));
    assert_eq!(started["state"]["phase"], "round_in_progress");
    assert_eq!(started["state"]["current_player"], "alice");

    let heard = read_until(&mut stream, "event:playerTurn").await;
    assert!(heard.contains("event:newRound"));

    let (status, rejected) = send(
        &client,
        hyper::Method::POST,
        bob_actions.clone(),
        Some(json!({ "type": "drawCard" })),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CONFLICT);
    assert_eq!(rejected["error"], "not_your_turn");
    assert_eq!(rejected["details"]["current_player"], "alice");
    read_until(&mut stream, "event:notYourTurn").await;

    let (status, drawn) = send(
        &client,
        hyper::Method::POST,
        alice_actions.clone(),
        Some(json!({ "type": "drawCard" })),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(drawn["state"]["hand"].as_array().expect("own hand").len(), 8);
    let hidden_draw = read_until(&mut stream, "event:cardDrawn").await;
    assert!(hidden_draw.contains("\"card\":null"));

    let (status, public) = send(
        &client,
        hyper::Method::GET,
        format!("http://{address}/api/tables/{table_id}"),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert!(public["state"]["hand"].is_null());
    assert_eq!(public["state"]["hand_sizes"]["alice"], 8);
    assert_eq!(public["state"]["hand_sizes"]["bob"], 7);

    let (status, _) = send(
        &client,
        hyper::Method::POST,
        alice_actions.clone(),
        Some(json!({ "type": "discardCard", "card": { "suit": "nope", "rank": "7" } })),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);

    // Closing the stream leaves bob seated.
    drop(stream);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let (_, still_seated) = send(
        &client,
        hyper::Method::GET,
        format!("http://{address}/api/tables/{table_id}"),
        None,
    )
    .await;
    assert_eq!(still_seated["state"]["players"], json!(["alice", "bob"]));

    let (status, health) = send(&client, hyper::Method::GET, format!("http://{address}/health"), None).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["tables"], 1);

    let (status, _) = send(
        &client,
        hyper::Method::DELETE,
        format!("{players}/bob"),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::NO_CONTENT);

    let (status, _) = send(
        &client,
        hyper::Method::DELETE,
        format!("http://{address}/api/tables/{table_id}"),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::NO_CONTENT);

    let (status, missing) = send(
        &client,
        hyper::Method::GET,
        format!("http://{address}/api/tables/{table_id}"),
        None,
    )
    .await;
    assert_eq!(status, hyper::StatusCode::NOT_FOUND);
    assert_eq!(missing["error"], "table_not_found");

    handle.shutdown().await.expect("shutdown server");
}

#[tokio::test]
async fn event_stream_requires_a_seated_player() {
    let server = WebServer::from_context(AppContext::new_for_tests());
    let handle = server.start().await.expect("start server");
    let address = handle.address();
    let client = HyperClient::new();

    tokio::time::sleep(Duration::from_millis(20)).await;

    let (_, created) = send(
        &client,
        hyper::Method::POST,
        format!("http://{address}/api/tables"),
        Some(json!({})),
    )
    .await;
    let table_id = created["table_id"].as_str().expect("table id");

    let uri: hyper::Uri = format!("http://{address}/api/tables/{table_id}/players/ghost/events")
        .parse()
        .expect("parse uri");
    let response = client.get(uri).await.expect("request stream");
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);

    let uri: hyper::Uri = format!("http://{address}/api/tables/missing/players/ghost/events")
        .parse()
        .expect("parse uri");
    let response = client.get(uri).await.expect("request stream");
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);

    handle.shutdown().await.expect("shutdown server");
}

#[tokio::test]
async fn minted_player_ids_and_bad_config() {
    let server = WebServer::from_context(AppContext::new_for_tests());
    let handle = server.start().await.expect("start server");
    let address = handle.address();
    let client = HyperClient::new();

    tokio::time::sleep(Duration::from_millis(20)).await;

    let (status, err) = send(
        &client,
        hyper::Method::POST,
        format!("http://{address}/api/tables"),
        Some(json!({ "draw_pile": "sideways" })),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_table_config");

    let (_, created) = send(
        &client,
        hyper::Method::POST,
        format!("http://{address}/api/tables"),
        Some(json!({ "seed": 5 })),
    )
    .await;
    let table_id = created["table_id"].as_str().expect("table id");
    let (status, joined) = send(
        &client,
        hyper::Method::POST,
        format!("http://{address}/api/tables/{table_id}/players"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CREATED);
    assert!(!joined["player_id"].as_str().unwrap_or_default().is_empty());

    let (status, listed) = send(&client, hyper::Method::GET, format!("http://{address}/api/tables"), None).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["players"], 1);

    handle.shutdown().await.expect("shutdown server");
}
