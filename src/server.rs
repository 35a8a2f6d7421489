use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::GraphQLRequest;
use crate::response::{GraphQLError, GraphQLResponse, codes};

/// Anything that answers GraphQL requests over the shared HTTP surface.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Shown as the GraphiQL page title.
    fn name(&self) -> &str;

    /// Preloaded into the GraphiQL editor.
    fn default_query(&self) -> &str;

    async fn handle(&self, request: GraphQLRequest) -> GraphQLResponse;
}

type ResponseBody = BoxBody<Bytes, hyper::Error>;

fn full<T: Into<Bytes>>(value: T) -> ResponseBody {
    Full::new(value.into())
        .map_err(|never| match never {})
        .boxed()
}

const GRAPHIQL_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>GraphiQL - {{TITLE}}</title>
  <link href="https://unpkg.com/graphiql@1.5.0/graphiql.min.css" rel="stylesheet" />
  <style>
    body { margin: 0; padding: 0; height: 100vh; }
    #graphiql { height: 100vh; }
  </style>
</head>
<body>
  <div id="graphiql"></div>

  <script src="https://unpkg.com/react@17.0.2/umd/react.production.min.js"></script>
  <script src="https://unpkg.com/react-dom@17.0.2/umd/react-dom.production.min.js"></script>
  <script src="https://unpkg.com/graphiql@1.5.0/graphiql.min.js"></script>
  <script>
    function graphQLFetcher(graphQLParams) {
      return fetch('/graphql', {
        method: 'post',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(graphQLParams),
      }).then(response => response.json());
    }

    ReactDOM.render(
      React.createElement(GraphiQL, { fetcher: graphQLFetcher, defaultQuery: {{DEFAULT_QUERY}} }),
      document.getElementById('graphiql')
    );
  </script>
</body>
</html>
"#;

fn graphiql_page<H: RequestHandler + ?Sized>(handler: &H) -> String {
    let default_query =
        serde_json::to_string(handler.default_query()).unwrap_or_else(|_| "\"\"".to_string());
    GRAPHIQL_HTML
        .replace("{{TITLE}}", handler.name())
        .replace("{{DEFAULT_QUERY}}", &default_query)
}

fn json_response(status: StatusCode, payload: &GraphQLResponse) -> Response<ResponseBody> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(full(json))
        .unwrap_or_else(|_| internal_server_error())
}

fn bad_request(message: String) -> Response<ResponseBody> {
    let payload = GraphQLResponse::from_error(GraphQLError::new(message).with_code(codes::BAD_REQUEST));
    json_response(StatusCode::BAD_REQUEST, &payload)
}

fn internal_server_error() -> Response<ResponseBody> {
    let mut response = Response::new(full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

pub async fn handle_request<B, H>(
    req: Request<B>,
    handler: Arc<H>,
) -> Result<Response<ResponseBody>, Infallible>
where
    B: Body,
    B::Error: Display,
    H: RequestHandler + ?Sized,
{
    let result = match (req.method(), req.uri().path()) {
        (&Method::POST, "/graphql") => {
            let body_bytes = match req.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => return Ok(bad_request(format!("Failed to read request body: {}", e))),
            };

            match serde_json::from_slice::<GraphQLRequest>(&body_bytes) {
                Ok(graphql_req) => {
                    let response = handler.handle(graphql_req).await;
                    json_response(StatusCode::OK, &response)
                }
                Err(e) => {
                    debug!(error = %e, "rejected malformed request body");
                    bad_request(format!("Invalid JSON request: {}", e))
                }
            }
        }

        (&Method::GET, "/graphql") => Response::builder()
            .header(header::CONTENT_TYPE, "text/html")
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(full(graphiql_page(handler.as_ref())))
            .unwrap_or_else(|_| internal_server_error()),

        (&Method::GET, "/") => Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, "/graphql")
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(full(""))
            .unwrap_or_else(|_| internal_server_error()),

        (&Method::GET, "/health") => Response::builder()
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(full("ok"))
            .unwrap_or_else(|_| internal_server_error()),

        (&Method::OPTIONS, _) => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS")
            .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type")
            .body(full(""))
            .unwrap_or_else(|_| internal_server_error()),

        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
            .body(full("Not Found"))
            .unwrap_or_else(|_| internal_server_error()),
    };

    Ok(result)
}

#[derive(Clone)]
// An Executor that uses the tokio runtime.
pub struct TokioExecutor;

impl<F> hyper::rt::Executor<F> for TokioExecutor
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::task::spawn(fut);
    }
}

/// Accepts connections until the listener fails, serving each on its own task.
pub async fn serve<H: RequestHandler>(listener: TcpListener, handler: Arc<H>) -> std::io::Result<()> {
    info!(
        name = handler.name(),
        address = %listener.local_addr()?,
        "listening for GraphQL requests"
    );

    loop {
        let (stream, remote) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let handler = Arc::clone(&handler);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, Arc::clone(&handler)));

            match hyper_util::server::conn::auto::Builder::new(TokioExecutor)
                .serve_connection(io, service)
                .await
            {
                Ok(_) => debug!(%remote, "connection closed"),
                Err(e) => warn!(%remote, error = %e, "error processing connection"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn default_query(&self) -> &str {
            "{ echo }"
        }

        async fn handle(&self, request: GraphQLRequest) -> GraphQLResponse {
            GraphQLResponse::from_data(json!({ "echo": request.query, "operationName": request.operation_name }))
        }
    }

    async fn send(method: Method, path: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        let response = handle_request(request, Arc::new(Echo)).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn posts_are_handed_to_the_handler() {
        let (status, body) = send(
            Method::POST,
            "/graphql",
            r#"{"query": "{ a }", "operationName": "A", "variables": null}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({ "data": { "echo": "{ a }", "operationName": "A" } })
        );
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let (status, body) = send(Method::POST, "/graphql", r#"{"variables": {}}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["errors"][0]["extensions"]["code"], json!("BAD_REQUEST"));
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn serves_graphiql_health_and_not_found() {
        let (status, page) = send(Method::GET, "/graphql", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("<title>GraphiQL - Echo</title>"));
        assert!(page.contains(r#"defaultQuery: "{ echo }""#));

        assert_eq!(send(Method::GET, "/health", "").await, (StatusCode::OK, "ok".to_string()));
        assert_eq!(send(Method::GET, "/", "").await.0, StatusCode::FOUND);
        assert_eq!(send(Method::OPTIONS, "/graphql", "").await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(Method::GET, "/metrics", "").await.0, StatusCode::NOT_FOUND);
    }
}
