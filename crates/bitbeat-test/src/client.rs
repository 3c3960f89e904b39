//! Test client for in-process dispatch.

use std::net::SocketAddr;
use std::sync::Arc;

use bitbeat_server::{PreparedServer, TransportHandle, WebServer};
use bytes::Bytes;
use http::Method;
use serde::Serialize;

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;

/// A client dispatching requests straight into a prepared server.
///
/// Every request from one client travels over the same simulated
/// transport, the way a browser reuses one keep-alive connection.
///
/// # Example
///
/// ```rust
/// use bitbeat_core::{ActionDefinition, FnAction};
/// use bitbeat_server::WebServer;
/// use bitbeat_test::TestClient;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let server = WebServer::builder()
///     .action(FnAction::from_sync(ActionDefinition::builder("ping").build(), |_| {
///         Ok(Some(json!({"pong": true})))
///     }))
///     .build();
/// let client = TestClient::from_server(server).unwrap();
///
/// let response = client.get("/api/v1/ping").send().await;
/// assert_eq!(response.status(), 200);
/// assert_eq!(response.json_value().unwrap(), json!({"pong": true}));
/// # });
/// ```
#[must_use]
pub struct TestClient {
    server: Arc<PreparedServer>,
    transport: TransportHandle,
    default_headers: Vec<(String, String)>,
    remote: Option<SocketAddr>,
}

impl TestClient {
    /// Creates a client for a prepared server.
    pub fn new(server: PreparedServer) -> Self {
        Self::shared(Arc::new(server))
    }

    /// Creates a client sharing a prepared server with other clients.
    pub fn shared(server: Arc<PreparedServer>) -> Self {
        Self {
            server,
            transport: TransportHandle::new(),
            default_headers: Vec::new(),
            remote: None,
        }
    }

    /// Prepares `server` and creates a client for it.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Server`] if preparation fails.
    pub fn from_server(server: WebServer) -> Result<Self, TestError> {
        Ok(Self::new(server.prepare()?))
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the remote address every request comes from.
    pub fn with_remote_addr(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Returns the prepared server.
    #[must_use]
    pub fn server(&self) -> &Arc<PreparedServer> {
        &self.server
    }

    /// Returns the simulated transport.
    #[must_use]
    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Simulates the client closing its transport. Returns the number of
    /// connections evicted.
    pub async fn close_transport(&self) -> usize {
        self.server
            .connections()
            .transport_closed(self.transport.id())
            .await
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest::new(self, TestRequestBuilder::new(method, uri))
    }

    async fn send_internal(&self, request: TestRequest) -> Result<TestResponse, TestError> {
        let remote = request.remote;
        let response = self
            .server
            .dispatch_on(request.into_http_request(), remote, &self.transport)
            .await;
        TestResponse::from_http(response).await
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("server", &self.server)
            .field("transport", &self.transport.id())
            .field("default_headers", &self.default_headers)
            .field("remote", &self.remote)
            .finish()
    }
}

/// A request builder bound to a test client.
#[must_use]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl<'a> TestClientRequest<'a> {
    fn new(client: &'a TestClient, mut builder: TestRequestBuilder) -> Self {
        for (name, value) in &client.default_headers {
            builder = builder.header(name, value);
        }
        if let Some(remote) = client.remote {
            builder = builder.remote_addr(remote);
        }
        Self { client, builder }
    }

    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the Accept header.
    pub fn accept(mut self, accept: impl AsRef<str>) -> Self {
        self.builder = self.builder.accept(accept);
        self
    }

    /// Sets the `accept-version` header.
    pub fn accept_version(mut self, version: impl AsRef<str>) -> Self {
        self.builder = self.builder.accept_version(version);
        self
    }

    /// Appends a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.builder = self.builder.query(name, value);
        self
    }

    /// Sets the address this request comes from.
    pub fn remote_addr(mut self, remote: SocketAddr) -> Self {
        self.builder = self.builder.remote_addr(remote);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sets a form-urlencoded body.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.form(value);
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built; use
    /// [`try_send`](Self::try_send) to handle that case.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Returns the error recorded while building the request or reading
    /// the response.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.send_internal(request).await
    }
}
