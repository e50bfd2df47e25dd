use std::net::SocketAddr;

use autoroute::assets::MemoryAssets;
use autoroute::codec::HandlerError;
use autoroute::context::Context;
use autoroute::handler::Endpoint;
use autoroute::{Response, Router, RouterOption, Server, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::Span;

async fn spawn(router: Router) -> SocketAddr {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.serve(router));
    addr
}

async fn send(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[derive(Deserialize)]
struct Note {
    text: String,
}

fn app(options: Vec<RouterOption>) -> Router {
    let mut router = Router::new(Span::none(), options).unwrap();
    router
        .get("/health", |_ctx: Context| async {
            Response::new(StatusCode::Ok).body("ok")
        })
        .unwrap();
    router
        .register(
            "POST",
            "/notes",
            Endpoint::function(|_ctx: Context, note: Note| async move {
                Ok::<_, HandlerError>(json!({ "length": note.text.len() }))
            }),
            vec![],
        )
        .unwrap();
    router
}

#[tokio::test]
async fn serves_exact_routes_over_tcp() {
    let addr = spawn(app(vec![])).await;

    let res = send(addr, "GET /health HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert!(res.ends_with("\r\n\r\nok"));
    assert!(!res.contains("Strict-Transport-Security"));
}

#[tokio::test]
async fn adapts_json_functions_over_tcp() {
    let addr = spawn(app(vec![])).await;

    let body = r#"{"text":"hello"}"#;
    let raw = format!(
        "POST /notes HTTP/1.1\r\nHost: t\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let res = send(addr, &raw).await;
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert!(res.contains("Content-Type: application/json\r\n"));
    assert!(res.ends_with(r#"{"length":5}"#));
}

#[tokio::test]
async fn reports_not_found_and_method_not_allowed() {
    let addr = spawn(app(vec![])).await;

    let res = send(addr, "GET /missing HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 404 Not Found\r\n"), "{res}");

    let res = send(addr, "PUT /health HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{res}");

    let res = send(addr, "OPTIONS /anything HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert!(res.contains("Content-Length: 0\r\n"));
}

#[tokio::test]
async fn hsts_header_is_added_when_enabled() {
    let addr = spawn(app(vec![RouterOption::EnableHsts])).await;

    let res = send(addr, "GET /health HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n").await;
    assert!(
        res.contains("Strict-Transport-Security: max-age=63072000; includeSubDomains\r\n"),
        "{res}"
    );
}

#[tokio::test]
async fn falls_back_to_embedded_assets() {
    let assets = MemoryAssets::new().with_file("site/index.html", "<p>home</p>");
    let addr = spawn(app(vec![RouterOption::embedded_assets(assets, "site")])).await;

    let res = send(addr, "GET / HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert!(res.contains("Content-Type: text/html; charset=utf-8\r\n"));
    assert!(res.ends_with("<p>home</p>"));
}

#[tokio::test]
async fn keeps_connection_alive_across_requests() {
    let addr = spawn(app(vec![])).await;

    let raw = "GET /health HTTP/1.1\r\nHost: t\r\n\r\nGET /health HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n";
    let res = send(addr, raw).await;
    assert_eq!(res.matches("HTTP/1.1 200 OK\r\n").count(), 2, "{res}");
}

#[tokio::test]
async fn oversized_content_length_gets_413() {
    let addr = spawn(app(vec![])).await;

    for length in ["18446744073709551615", "9000000"] {
        let raw = format!("POST /notes HTTP/1.1\r\nHost: t\r\nContent-Length: {length}\r\n\r\n");
        let res = send(addr, &raw).await;
        assert!(res.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{res}");
        assert!(res.contains("Connection: close\r\n"));
    }
}

#[tokio::test]
async fn percent_encoded_paths_reach_decoded_routes() {
    let mut router = app(vec![]);
    router
        .get("/a b", |_ctx: Context| async {
            Response::new(StatusCode::Ok).body("spaced")
        })
        .unwrap();
    let addr = spawn(router).await;

    let res = send(addr, "GET /a%20b HTTP/1.1\r\nHost: t\r\nConnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert!(res.ends_with("spaced"));
}
