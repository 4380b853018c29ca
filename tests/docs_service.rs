//! Integration tests for the documentation service: block pagination,
//! recursive expansion and error relay against a mock Notion API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fleetgate::docs::DocsServer;
use fleetgate::error::NotionError;
use fleetgate::notion::NotionClient;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Canned routes for the mock Notion API, keyed by full path+query
type Routes = Arc<HashMap<String, Value>>;
/// Auth/version headers seen per request, for assertion
type HeaderLog = Arc<Mutex<Vec<(String, Option<String>, Option<String>)>>>;

async fn spawn_mock_notion(port: u16, routes: Routes) -> HeaderLog {
    let log: HeaderLog = Arc::new(Mutex::new(Vec::new()));
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let task_log = Arc::clone(&log);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let routes = Arc::clone(&routes);
            let log = Arc::clone(&task_log);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let routes = Arc::clone(&routes);
                    let log = Arc::clone(&log);
                    async move {
                        let uri = req.uri().to_string();
                        let header = |name: &str| {
                            req.headers()
                                .get(name)
                                .and_then(|v| v.to_str().ok())
                                .map(String::from)
                        };
                        log.lock().push((
                            uri.clone(),
                            header("authorization"),
                            header("notion-version"),
                        ));

                        let (status, body) = match routes.get(&uri) {
                            Some(value) => (200, value.to_string()),
                            None => (404, json!({"message": "object_not_found"}).to_string()),
                        };
                        Ok::<_, hyper::Error>(
                            hyper::Response::builder()
                                .status(status)
                                .header("content-type", "application/json")
                                .body(Full::new(Bytes::from(body)))
                                .unwrap(),
                        )
                    }
                });
                let _ = AutoBuilder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    log
}

/// A page whose children span two cursor pages and nest two levels deep
fn manual_routes() -> Routes {
    let mut routes = HashMap::new();

    routes.insert(
        "/pages/page1".to_string(),
        json!({
            "id": "page1",
            "object": "page",
            "properties": {
                "title": {
                    "type": "title",
                    "title": [{"plain_text": "Fleet Manual"}]
                }
            }
        }),
    );

    routes.insert(
        "/blocks/page1/children?page_size=100".to_string(),
        json!({
            "results": [
                {"id": "b1", "type": "paragraph", "has_children": false,
                 "paragraph": {"rich_text": [{"plain_text": "intro"}]}},
                {"id": "b2", "type": "toggle", "has_children": true,
                 "toggle": {"rich_text": [{"plain_text": "details"}]}}
            ],
            "has_more": true,
            "next_cursor": "cur2"
        }),
    );
    routes.insert(
        "/blocks/page1/children?page_size=100&start_cursor=cur2".to_string(),
        json!({
            "results": [
                {"id": "b3", "type": "paragraph", "has_children": false,
                 "paragraph": {"rich_text": [{"plain_text": "outro"}]}}
            ],
            "has_more": false,
            "next_cursor": null
        }),
    );

    routes.insert(
        "/blocks/b2/children?page_size=100".to_string(),
        json!({
            "results": [
                {"id": "b2c1", "type": "bulleted_list_item", "has_children": true,
                 "bulleted_list_item": {"rich_text": [{"plain_text": "nested"}]}}
            ],
            "has_more": false,
            "next_cursor": null
        }),
    );
    routes.insert(
        "/blocks/b2c1/children?page_size=100".to_string(),
        json!({
            "results": [
                {"id": "leaf", "type": "paragraph", "has_children": false,
                 "paragraph": {"rich_text": [{"plain_text": "deep"}]}}
            ],
            "has_more": false,
            "next_cursor": null
        }),
    );

    Arc::new(routes)
}

fn client_for(port: u16) -> NotionClient {
    NotionClient::with_base_url("secret_test_token", &format!("http://127.0.0.1:{}", port))
        .unwrap()
}

async fn wait_for_port(port: u16, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .is_ok()
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn http_get(port: u16, path: &str) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1:{}\r\nConnection: close\r\n\r\n",
        path, port
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();

    let pos = response.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let head = String::from_utf8_lossy(&response[..pos]).to_string();
    let status = head
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|c| c.parse().ok())
        .unwrap();
    (status, response[pos + 4..].to_vec())
}

// ============================================================================
// Notion client
// ============================================================================

#[tokio::test]
async fn test_pagination_and_recursive_expansion() {
    let headers = spawn_mock_notion(48201, manual_routes()).await;
    assert!(wait_for_port(48201, Duration::from_secs(5)).await);
    let client = client_for(48201);

    let document = client.page_document("page1").await.unwrap();

    assert_eq!(document.id, "page1");
    assert_eq!(document.title, "Fleet Manual");

    // Both cursor pages concatenated in order
    let ids: Vec<_> = document
        .blocks
        .iter()
        .map(|b| b["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["b1", "b2", "b3"]);

    // Depth-first expansion attached under `children`
    let b2 = &document.blocks[1];
    let children = b2["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["id"], "b2c1");
    let grandchildren = children[0]["children"].as_array().unwrap();
    assert_eq!(grandchildren[0]["id"], "leaf");

    // Leaves are not decorated
    assert!(document.blocks[0].get("children").is_none());

    // Every call carried the token and the pinned API version
    for (uri, auth, version) in headers.lock().iter() {
        assert_eq!(auth.as_deref(), Some("Bearer secret_test_token"), "{}", uri);
        assert_eq!(version.as_deref(), Some("2022-06-28"), "{}", uri);
    }
}

#[tokio::test]
async fn test_api_error_is_preserved() {
    let _headers = spawn_mock_notion(48202, Arc::new(HashMap::new())).await;
    assert!(wait_for_port(48202, Duration::from_secs(5)).await);
    let client = client_for(48202);

    let err = client.page_document("nope").await.unwrap_err();
    match err {
        NotionError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "object_not_found");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

// ============================================================================
// Docs server
// ============================================================================

async fn start_docs_server(docs_port: u16, notion_port: u16) -> watch::Sender<bool> {
    let (tx, rx) = watch::channel(false);
    let addr: SocketAddr = format!("127.0.0.1:{}", docs_port).parse().unwrap();
    let server = DocsServer::new(addr, client_for(notion_port), rx);
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    assert!(
        wait_for_port(docs_port, Duration::from_secs(5)).await,
        "docs server did not start in time"
    );
    tx
}

#[tokio::test]
async fn test_page_endpoint_serves_document() {
    let _headers = spawn_mock_notion(48203, manual_routes()).await;
    assert!(wait_for_port(48203, Duration::from_secs(5)).await);
    let _shutdown = start_docs_server(48303, 48203).await;

    let (status, body) = http_get(48303, "/api/notion/page/page1").await;
    assert_eq!(status, 200);

    let document: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(document["id"], "page1");
    assert_eq!(document["title"], "Fleet Manual");
    assert_eq!(document["blocks"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_page_endpoint_relays_api_errors() {
    let _headers = spawn_mock_notion(48204, Arc::new(HashMap::new())).await;
    assert!(wait_for_port(48204, Duration::from_secs(5)).await);
    let _shutdown = start_docs_server(48304, 48204).await;

    let (status, body) = http_get(48304, "/api/notion/page/missing").await;
    assert_eq!(status, 404);

    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "object_not_found");
}

#[tokio::test]
async fn test_health_and_unknown_paths() {
    let _headers = spawn_mock_notion(48205, Arc::new(HashMap::new())).await;
    assert!(wait_for_port(48205, Duration::from_secs(5)).await);
    let _shutdown = start_docs_server(48305, 48205).await;

    let (status, body) = http_get(48305, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body, b"ok");

    let (status, _) = http_get(48305, "/api/notion/databases/x").await;
    assert_eq!(status, 404);

    let (status, body) = http_get(48305, "/api/notion/page/").await;
    assert_eq!(status, 400);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("page id"));
}
