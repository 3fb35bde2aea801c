// file: src/http/client.rs
// description: http client whose requests are exposed as progress streams
// reference: https://docs.rs/reqwest

use super::auth::{AuthType, Credentials, authorization_header};
use super::body::{Payload, RequestBody};
use super::params::{Params, fill_path_params, stringify_params};
use super::transfer::TransferProgress;
use crate::error::HttpError;
use crate::progress::{Cleanup, Emitter, Progress};
use crate::utils::Validator;
use crate::utils::telemetry::OperationTimer;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

/// Error bodies longer than this are cut before landing in `HttpError::Status`.
const MAX_STATUS_BODY_CHARS: usize = 256;

pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpClientOptions {
    pub base_url: String,
    pub auth_type: AuthType,
    pub headers: Headers,
    pub timeout: Option<Duration>,
}

impl HttpClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Per-request settings. Credentials and auth type fall back to the
/// client's when unset.
#[derive(Debug, Clone, Default)]
pub struct HttpRequestOptions {
    pub uri_params: Params,
    pub path_params: Params,
    pub auth: bool,
    pub credentials: Option<Credentials>,
    pub auth_type: Option<AuthType>,
    pub headers: Headers,
    pub include_download_progress: bool,
}

impl HttpRequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uri_params(mut self, params: Params) -> Self {
        self.uri_params = params;
        self
    }

    pub fn with_path_params(mut self, params: Params) -> Self {
        self.path_params = params;
        self
    }

    pub fn authorized(mut self) -> Self {
        self.auth = true;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials, auth_type: AuthType) -> Self {
        self.auth = true;
        self.credentials = Some(credentials);
        self.auth_type = Some(auth_type);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_download_progress(mut self) -> Self {
        self.include_download_progress = true;
        self
    }
}

/// Fully resolved request, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> Result<String, HttpError> {
        String::from_utf8(self.body.clone()).map_err(|e| HttpError::Decode(e.to_string()))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HttpEvent {
    DownloadProgress(TransferProgress),
    Response(HttpResponse),
}

impl HttpEvent {
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            HttpEvent::Response(response) => Some(response),
            HttpEvent::DownloadProgress(_) => None,
        }
    }
}

pub struct HttpClient {
    inner: Client,
    options: HttpClientOptions,
    credentials: RefCell<Option<Credentials>>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("options", &self.options)
            .field("credentials", &self.credentials.borrow())
            .finish()
    }
}

impl HttpClient {
    pub fn new(options: HttpClientOptions) -> Result<Self, HttpError> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let inner = builder.build()?;

        Ok(Self {
            inner,
            options,
            credentials: RefCell::new(None),
        })
    }

    pub fn options(&self) -> &HttpClientOptions {
        &self.options
    }

    pub fn set_authorization(&self, token: impl Into<String>) {
        *self.credentials.borrow_mut() = Some(Credentials::token(token));
    }

    pub fn set_basic_authorization(&self, username: impl Into<String>, password: impl Into<String>) {
        *self.credentials.borrow_mut() = Some(Credentials::basic(username, password));
    }

    pub fn clear_authorization(&self) {
        self.credentials.borrow_mut().take();
    }

    /// Resolves URL, headers and body without touching the network.
    pub fn prepare(
        &self,
        method: Method,
        uri: &str,
        payload: Option<Payload>,
        options: &HttpRequestOptions,
    ) -> Result<PreparedRequest, HttpError> {
        let path = fill_path_params(uri, &options.path_params);
        let url = format!(
            "{}{}{}",
            self.options.base_url,
            path,
            stringify_params(&options.uri_params)
        );
        let body = RequestBody::from_payload(payload)?;

        let mut headers = self.options.headers.clone();
        if let Some(content_type) = body.content_type() {
            if !matches!(body, RequestBody::Multipart(_)) {
                headers.insert("content-type".to_string(), content_type.to_string());
            }
        }
        if options.auth {
            let credentials = match &options.credentials {
                Some(credentials) => credentials.clone(),
                None => self
                    .credentials
                    .borrow()
                    .clone()
                    .ok_or(HttpError::MissingAuthToken)?,
            };
            let auth_type = options.auth_type.unwrap_or(self.options.auth_type);
            headers.insert(
                "authorization".to_string(),
                authorization_header(&credentials, auth_type)?,
            );
        }
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(PreparedRequest {
            method,
            url,
            headers,
            body,
        })
    }

    pub fn get(&self, uri: &str, options: HttpRequestOptions) -> Progress<HttpEvent, HttpError> {
        self.request(Method::Get, uri, None, options)
    }

    pub fn delete(&self, uri: &str, options: HttpRequestOptions) -> Progress<HttpEvent, HttpError> {
        self.request(Method::Delete, uri, None, options)
    }

    pub fn post(
        &self,
        uri: &str,
        payload: impl Into<Payload>,
        options: HttpRequestOptions,
    ) -> Progress<HttpEvent, HttpError> {
        self.request(Method::Post, uri, Some(payload.into()), options)
    }

    pub fn put(
        &self,
        uri: &str,
        payload: impl Into<Payload>,
        options: HttpRequestOptions,
    ) -> Progress<HttpEvent, HttpError> {
        self.request(Method::Put, uri, Some(payload.into()), options)
    }

    pub fn patch(
        &self,
        uri: &str,
        payload: impl Into<Payload>,
        options: HttpRequestOptions,
    ) -> Progress<HttpEvent, HttpError> {
        self.request(Method::Patch, uri, Some(payload.into()), options)
    }

    /// Sends the request on a local task. Emits `DownloadProgress` events when
    /// enabled, then the `Response`, then finishes. Stopping the progress
    /// aborts the request.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio `LocalSet`.
    pub fn request(
        &self,
        method: Method,
        uri: &str,
        payload: Option<Payload>,
        options: HttpRequestOptions,
    ) -> Progress<HttpEvent, HttpError> {
        let builder = match self
            .prepare(method, uri, payload, &options)
            .and_then(|prepared| self.build(prepared))
        {
            Ok(builder) => builder,
            Err(err) => {
                debug!("{} {} rejected before dispatch: {}", method, uri, err);
                return Progress::failed(err);
            }
        };
        let include_progress = options.include_download_progress;
        let label = format!("{} {}", method, uri);
        let slow_after = self.slow_request_threshold();

        Progress::new(move |emitter| {
            let task = tokio::task::spawn_local(async move {
                let timer = OperationTimer::new(&label);
                let outcome = match send(builder, include_progress, &emitter).await {
                    Ok(response) => {
                        debug!("{} answered {}", label, response.status);
                        emitter
                            .emit(HttpEvent::Response(response))
                            .and_then(|_| emitter.finish())
                    }
                    Err(err) => {
                        debug!("{} failed: {}", label, err);
                        emitter.reject(err)
                    }
                };
                if let Some(threshold) = slow_after {
                    timer.warn_if_slow(threshold);
                }
                timer.finish();
                if let Err(violation) = outcome {
                    trace!("Response arrived after its progress closed: {}", violation);
                }
            });
            Some(Box::new(move || task.abort()) as Cleanup)
        })
    }

    /// Requests taking longer than half the client timeout are logged as slow.
    pub fn slow_request_threshold(&self) -> Option<Duration> {
        self.options.timeout.map(|timeout| timeout / 2)
    }

    fn build(&self, prepared: PreparedRequest) -> Result<RequestBuilder, HttpError> {
        let mut builder = self
            .inner
            .request(prepared.method.as_reqwest(), &prepared.url);
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        prepared.body.apply(builder)
    }
}

async fn send(
    builder: RequestBuilder,
    include_progress: bool,
    emitter: &Emitter<HttpEvent, HttpError>,
) -> Result<HttpResponse, HttpError> {
    let response = builder.send().await?;
    let status = response.status();
    let headers: Headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let total = response.content_length().unwrap_or(0);

    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        body.extend_from_slice(&chunk?);
        if include_progress {
            let progress = TransferProgress::new(body.len() as u64, total);
            if emitter.emit(HttpEvent::DownloadProgress(progress)).is_err() {
                trace!("Dropping download progress on a closed request");
            }
        }
    }

    if !status.is_success() {
        return Err(HttpError::Status {
            status: status.as_u16(),
            body: Validator::truncate_text(&String::from_utf8_lossy(&body), MAX_STATUS_BODY_CHARS),
        });
    }

    Ok(HttpResponse {
        status: status.as_u16(),
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::{FilePart, RequestData};
    use crate::params;
    use crate::progress::{Listeners, ProgressState};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::rc::Rc;
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type Events = Rc<RefCell<Vec<HttpEvent>>>;

    fn collect(progress: &Progress<HttpEvent, HttpError>) -> (Events, oneshot::Receiver<Result<(), HttpError>>) {
        let events: Events = Rc::new(RefCell::new(Vec::new()));
        let (tx, rx) = oneshot::channel();
        let tx = Rc::new(RefCell::new(Some(tx)));
        let on_error = tx.clone();
        let sink = events.clone();
        progress.subscribe(
            Listeners::emit(move |event: &HttpEvent, _| sink.borrow_mut().push(event.clone()))
                .on_error(move |e: &HttpError| {
                    if let Some(tx) = on_error.borrow_mut().take() {
                        let _ = tx.send(Err(e.clone()));
                    }
                })
                .on_finish(move || {
                    if let Some(tx) = tx.borrow_mut().take() {
                        let _ = tx.send(Ok(()));
                    }
                }),
        );
        (events, rx)
    }

    fn client(base_url: &str) -> HttpClient {
        HttpClient::new(HttpClientOptions::new(base_url).with_header("x-client", "reactik")).unwrap()
    }

    #[test]
    fn test_prepare_fills_url_and_merges_headers() {
        let client = client("https://api.example.com");
        let options = HttpRequestOptions::new()
            .with_path_params(params! { "id" => 7 })
            .with_uri_params(params! { "page" => 2, "q" => "rust" })
            .with_header("x-client", "override");

        let prepared = client.prepare(Method::Get, "/users/{id}", None, &options).unwrap();
        assert_eq!(prepared.url, "https://api.example.com/users/7?page=2&q=rust");
        assert_eq!(prepared.headers.get("x-client").map(String::as_str), Some("override"));
        assert_eq!(prepared.body, RequestBody::Empty);
    }

    #[test]
    fn test_prepare_requires_token_when_authorized() {
        let client = client("https://api.example.com");
        let options = HttpRequestOptions::new().authorized();
        let err = client.prepare(Method::Get, "/me", None, &options).unwrap_err();
        assert_eq!(err, HttpError::MissingAuthToken);

        client.set_authorization("abc");
        let prepared = client.prepare(Method::Get, "/me", None, &options).unwrap();
        assert_eq!(
            prepared.headers.get("authorization").map(String::as_str),
            Some("Bearer abc")
        );
    }

    #[test]
    fn test_prepare_basic_authorization() {
        let client = HttpClient::new(
            HttpClientOptions::new("https://api.example.com").with_auth_type(AuthType::Basic),
        )
        .unwrap();
        client.set_basic_authorization("alice", "secret");

        let prepared = client
            .prepare(Method::Get, "/me", None, &HttpRequestOptions::new().authorized())
            .unwrap();
        assert_eq!(
            prepared.headers.get("authorization").map(String::as_str),
            Some("Basic YWxpY2U6c2VjcmV0")
        );
    }

    #[test]
    fn test_prepare_multipart_leaves_content_type_to_transport() {
        let client = client("https://api.example.com");
        let mut fields = RequestData::new();
        fields.insert("file".to_string(), FilePart::new("a.txt", b"hi".to_vec()).into());

        let prepared = client
            .prepare(Method::Post, "/upload", Some(fields.into()), &HttpRequestOptions::new())
            .unwrap();
        assert!(matches!(prepared.body, RequestBody::Multipart(_)));
        assert!(!prepared.headers.contains_key("content-type"));
    }

    #[tokio::test]
    async fn test_missing_token_rejects_without_dispatch() {
        LocalSet::new()
            .run_until(async {
                let client = client("http://127.0.0.1:9");
                let progress = client.get("/me", HttpRequestOptions::new().authorized());
                assert_eq!(progress.state(), ProgressState::Errored);
                assert_eq!(progress.error().as_deref(), Some(&HttpError::MissingAuthToken));
            })
            .await;
    }

    #[tokio::test]
    async fn test_get_emits_response_then_finishes() {
        LocalSet::new()
            .run_until(async {
                let server = MockServer::start().await;
                Mock::given(method("GET"))
                    .and(path("/todos/1"))
                    .and(query_param("expand", "true"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "title": "Todo 1" })))
                    .mount(&server)
                    .await;

                let client = client(&server.uri());
                let progress = client.get(
                    "/todos/{id}",
                    HttpRequestOptions::new()
                        .with_path_params(params! { "id" => 1 })
                        .with_uri_params(params! { "expand" => true }),
                );
                let (events, done) = collect(&progress);

                assert_eq!(done.await.unwrap(), Ok(()));
                let events = events.borrow();
                assert_eq!(events.len(), 1);
                let response = events[0].response().unwrap();
                assert_eq!(response.status, 200);
                let todo: serde_json::Value = response.json().unwrap();
                assert_eq!(todo, json!({ "id": 1, "title": "Todo 1" }));
            })
            .await;
    }

    #[tokio::test]
    async fn test_download_progress_precedes_response() {
        LocalSet::new()
            .run_until(async {
                let server = MockServer::start().await;
                Mock::given(method("GET"))
                    .and(path("/file"))
                    .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
                    .mount(&server)
                    .await;

                let client = client(&server.uri());
                let progress = client.get("/file", HttpRequestOptions::new().with_download_progress());
                let (events, done) = collect(&progress);

                assert_eq!(done.await.unwrap(), Ok(()));
                let events = events.borrow();
                assert!(events.len() >= 2);
                match &events[events.len() - 2] {
                    HttpEvent::DownloadProgress(progress) => assert_eq!(progress.percentage(), 100),
                    other => panic!("expected download progress, got {:?}", other),
                }
                assert!(matches!(events.last(), Some(HttpEvent::Response(_))));
            })
            .await;
    }

    #[tokio::test]
    async fn test_post_sends_json_with_bearer_token() {
        LocalSet::new()
            .run_until(async {
                let server = MockServer::start().await;
                Mock::given(method("POST"))
                    .and(path("/todos"))
                    .and(header("authorization", "Bearer abc"))
                    .and(body_json(json!({ "title": "Write tests", "done": false })))
                    .respond_with(ResponseTemplate::new(201).set_body_string("created"))
                    .mount(&server)
                    .await;

                let client = client(&server.uri());
                client.set_authorization("abc");
                let mut fields = RequestData::new();
                fields.insert("title".to_string(), "Write tests".into());
                fields.insert("done".to_string(), false.into());

                let progress = client.post("/todos", fields, HttpRequestOptions::new().authorized());
                let (events, done) = collect(&progress);

                assert_eq!(done.await.unwrap(), Ok(()));
                let response = events.borrow()[0].response().cloned().unwrap();
                assert_eq!(response.status, 201);
                assert_eq!(response.text().unwrap(), "created");
            })
            .await;
    }

    #[tokio::test]
    async fn test_error_status_rejects() {
        LocalSet::new()
            .run_until(async {
                let server = MockServer::start().await;
                Mock::given(method("DELETE"))
                    .and(path("/todos/9"))
                    .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
                    .mount(&server)
                    .await;

                let client = client(&server.uri());
                let progress = client.delete("/todos/9", HttpRequestOptions::new());
                let (events, done) = collect(&progress);

                assert_eq!(
                    done.await.unwrap(),
                    Err(HttpError::Status {
                        status: 404,
                        body: "missing".to_string()
                    })
                );
                assert!(events.borrow().is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn test_long_error_body_is_truncated() {
        LocalSet::new()
            .run_until(async {
                let server = MockServer::start().await;
                Mock::given(method("GET"))
                    .and(path("/broken"))
                    .respond_with(ResponseTemplate::new(500).set_body_string("e".repeat(1000)))
                    .mount(&server)
                    .await;

                let client = client(&server.uri());
                let progress = client.get("/broken", HttpRequestOptions::new());
                let (_events, done) = collect(&progress);

                let Err(HttpError::Status { status, body }) = done.await.unwrap() else {
                    panic!("expected a status error");
                };
                assert_eq!(status, 500);
                assert_eq!(body, format!("{}...", "e".repeat(MAX_STATUS_BODY_CHARS)));
            })
            .await;
    }

    #[test]
    fn test_slow_request_threshold_follows_timeout() {
        assert_eq!(client("http://localhost").slow_request_threshold(), None);
        let timed = HttpClient::new(
            HttpClientOptions::new("http://localhost").with_timeout(Duration::from_secs(10)),
        )
        .unwrap();
        assert_eq!(timed.slow_request_threshold(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_stop_aborts_request() {
        LocalSet::new()
            .run_until(async {
                let server = MockServer::start().await;
                Mock::given(method("GET"))
                    .and(path("/slow"))
                    .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
                    .mount(&server)
                    .await;

                let client = client(&server.uri());
                let progress = client.get("/slow", HttpRequestOptions::new());
                let (events, done) = collect(&progress);
                progress.stop();

                assert_eq!(done.await.unwrap(), Ok(()));
                assert!(events.borrow().is_empty());
            })
            .await;
    }
}
