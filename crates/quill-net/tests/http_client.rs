use std::time::Duration;

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, head},
};
use bytes::Bytes;
use futures::StreamExt;
use quill_net::{Headers, HttpClient, NetError, NetOptions, RangeSpec};
use rstest::*;
use tokio::net::TcpListener;
use url::Url;

const BODY: &[u8] = b"Hello, World!";

struct TestServer {
    base_url: Url,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn new(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });

        tokio::spawn(async move {
            server.await.unwrap();
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn url(&self, path: &str) -> Url {
        self.base_url.join(path).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

async fn body_endpoint() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::ETAG, "\"v1\"".parse().unwrap());
    (headers, BODY)
}

async fn range_endpoint(headers: HeaderMap) -> impl IntoResponse {
    let Some(range) = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.strip_suffix('-'))
        .and_then(|v| v.parse::<usize>().ok())
    else {
        return (StatusCode::OK, HeaderMap::new(), BODY.to_vec());
    };

    if range >= BODY.len() {
        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_RANGE,
            format!("bytes */{}", BODY.len()).parse().unwrap(),
        );
        return (
            StatusCode::RANGE_NOT_SATISFIABLE,
            response_headers,
            Vec::new(),
        );
    }

    let slice = &BODY[range..];
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_RANGE,
        format!("bytes {}-{}/{}", range, BODY.len() - 1, BODY.len())
            .parse()
            .unwrap(),
    );
    (
        StatusCode::PARTIAL_CONTENT,
        response_headers,
        slice.to_vec(),
    )
}

async fn ignore_range_endpoint() -> &'static [u8] {
    BODY
}

async fn head_endpoint() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, "13".parse().unwrap());
    headers.insert(header::CONTENT_TYPE, "application/octet-stream".parse().unwrap());
    (headers, ())
}

async fn missing_endpoint() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

#[fixture]
fn test_router() -> Router {
    Router::new()
        .route("/body", get(body_endpoint))
        .route("/range", get(range_endpoint))
        .route("/ignore-range", get(ignore_range_endpoint))
        .route("/head", head(head_endpoint))
        .route("/missing", get(missing_endpoint))
}

#[fixture]
async fn test_server(test_router: Router) -> TestServer {
    TestServer::new(test_router).await
}

#[fixture]
fn http_client() -> HttpClient {
    HttpClient::new(NetOptions::default())
}

async fn collect(mut body: quill_net::ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_bytes_success(#[future] test_server: TestServer, http_client: HttpClient) {
    let test_server = test_server.await;

    let result = http_client.get_bytes(test_server.url("/body"), None).await;

    assert_eq!(result.unwrap(), Bytes::from_static(BODY));
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_bytes_propagates_status(#[future] test_server: TestServer, http_client: HttpClient) {
    let test_server = test_server.await;

    let result = http_client
        .get_bytes(test_server.url("/missing"), None)
        .await;

    assert!(matches!(
        result,
        Err(NetError::HttpError { status: 404, .. })
    ));
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_streaming_exposes_status_and_headers(
    #[future] test_server: TestServer,
    http_client: HttpClient,
) {
    let test_server = test_server.await;

    let resp = http_client
        .get_streaming(test_server.url("/body"), None, None)
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.headers.etag(), Some("\"v1\""));
    assert_eq!(resp.headers.content_length(), Some(BODY.len() as u64));
    assert_eq!(collect(resp.body).await, BODY);
}

#[rstest]
#[case(0, BODY)]
#[case(7, b"World!")]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_streaming_ranged(
    #[future] test_server: TestServer,
    http_client: HttpClient,
    #[case] start: u64,
    #[case] expected: &'static [u8],
) {
    let test_server = test_server.await;

    let resp = http_client
        .get_streaming(
            test_server.url("/range"),
            Some(RangeSpec::from_start(start)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(resp.status, 206);
    assert_eq!(collect(resp.body).await, expected);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_streaming_does_not_judge_416(
    #[future] test_server: TestServer,
    http_client: HttpClient,
) {
    let test_server = test_server.await;

    let resp = http_client
        .get_streaming(
            test_server.url("/range"),
            Some(RangeSpec::from_start(100)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(resp.status, 416);
    assert_eq!(resp.headers.content_range(), Some("bytes */13"));
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_streaming_server_ignoring_range_returns_200(
    #[future] test_server: TestServer,
    http_client: HttpClient,
) {
    let test_server = test_server.await;

    let resp = http_client
        .get_streaming(
            test_server.url("/ignore-range"),
            Some(RangeSpec::from_start(5)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(collect(resp.body).await, BODY);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn head_returns_headers(#[future] test_server: TestServer, http_client: HttpClient) {
    let test_server = test_server.await;

    let headers = http_client.head(test_server.url("/head"), None).await.unwrap();

    assert_eq!(headers.content_length(), Some(13));
    assert_eq!(headers.content_type(), Some("application/octet-stream"));
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn custom_request_headers_are_sent(
    #[future] test_server: TestServer,
    http_client: HttpClient,
) {
    let test_server = test_server.await;

    let mut headers = Headers::new();
    headers.insert("Range", "bytes=7-");

    // Passing the range through the generic header path behaves the same as
    // the typed RangeSpec argument.
    let resp = http_client
        .get_streaming(test_server.url("/range"), None, Some(headers))
        .await
        .unwrap();

    assert_eq!(resp.status, 206);
    assert_eq!(collect(resp.body).await, b"World!");
}
