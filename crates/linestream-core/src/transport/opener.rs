//! Opening streaming HTTP connections

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use std::io;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use super::line_reader::LineReader;
use crate::config::DEFAULT_MAX_ERROR_BODY_BYTES;
use crate::error::StreamError;
use crate::request::{HttpMethod, RequestDescriptor};

const USER_AGENT: &str = concat!("linestream/", env!("CARGO_PKG_VERSION"));

/// One open connection: transport, line source and response status
///
/// Owned by the engine's read loop. Dropping it releases the body and the
/// transport, so every exit path closes the connection.
pub struct ConnectionHandle {
    client: Option<reqwest::Client>,
    reader: Option<LineReader>,
    status: u16,
}

impl ConnectionHandle {
    /// Handle without an HTTP transport, for custom openers
    pub fn new(reader: LineReader, status: u16) -> Self {
        Self {
            client: None,
            reader: Some(reader),
            status,
        }
    }

    pub fn with_client(client: reqwest::Client, reader: LineReader, status: u16) -> Self {
        Self {
            client: Some(client),
            reader: Some(reader),
            status,
        }
    }

    /// Status code of the response currently being read
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn client(&self) -> Option<&reqwest::Client> {
        self.client.as_ref()
    }

    /// `None` once the reader was released and not yet replaced
    pub fn reader_mut(&mut self) -> Option<&mut LineReader> {
        self.reader.as_mut()
    }

    /// Drop the current line source, keeping the transport
    pub fn release_reader(&mut self) {
        self.reader = None;
    }

    pub fn replace_reader(&mut self, reader: LineReader, status: u16) {
        self.reader = Some(reader);
        self.status = status;
    }

    /// Release reader and transport
    pub fn close(mut self) {
        let lines = self.reader.as_ref().map(|r| r.lines_read()).unwrap_or(0);
        self.reader = None;
        self.client = None;
        debug!("Connection closed after {} lines", lines);
    }
}

/// Opens streaming connections for the engine
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    /// Open a new transport and send the request
    async fn open(&self, request: &RequestDescriptor) -> Result<ConnectionHandle, StreamError>;

    /// Re-send the request over the handle's existing transport and replace its reader
    async fn reopen_reader(
        &self,
        handle: &mut ConnectionHandle,
        request: &RequestDescriptor,
    ) -> Result<(), StreamError>;
}

/// [`ConnectionOpener`] over reqwest
#[derive(Debug, Clone)]
pub struct HttpConnectionOpener {
    max_error_body_bytes: usize,
}

impl Default for HttpConnectionOpener {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERROR_BODY_BYTES)
    }
}

impl HttpConnectionOpener {
    pub fn new(max_error_body_bytes: usize) -> Self {
        Self {
            max_error_body_bytes,
        }
    }

    /// Build a client for one connection
    ///
    /// Only connecting is bounded; the response body is expected to stay open.
    fn build_client(&self, request: &RequestDescriptor) -> Result<reqwest::Client, StreamError> {
        reqwest::Client::builder()
            .connect_timeout(request.connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(StreamError::from_reqwest)
    }

    async fn send(
        &self,
        client: &reqwest::Client,
        request: &RequestDescriptor,
    ) -> Result<(LineReader, u16), StreamError> {
        let mut builder = match request.method {
            HttpMethod::Post => client
                .post(request.endpoint())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.query().to_string()),
            HttpMethod::Get => client.get(request.url.clone()),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(StreamError::from_reqwest)?;
        let status = response.status();

        if !status.is_success() {
            let body = self.read_error_body(response).await;
            warn!("Stream request rejected with HTTP {}", status.as_u16());
            return Err(StreamError::server(Some(status.as_u16()), &body));
        }

        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let reader = LineReader::new(StreamReader::new(body));

        Ok((reader, status.as_u16()))
    }

    /// Read at most `max_error_body_bytes` of a rejected response
    async fn read_error_body(&self, response: reqwest::Response) -> String {
        let mut body = Vec::new();
        let mut chunks = response.bytes_stream();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(chunk) => {
                    body.extend_from_slice(&chunk);
                    if body.len() >= self.max_error_body_bytes {
                        body.truncate(self.max_error_body_bytes);
                        break;
                    }
                }
                Err(e) => {
                    debug!("Error body read interrupted: {}", e);
                    break;
                }
            }
        }

        String::from_utf8_lossy(&body).into_owned()
    }
}

#[async_trait]
impl ConnectionOpener for HttpConnectionOpener {
    async fn open(&self, request: &RequestDescriptor) -> Result<ConnectionHandle, StreamError> {
        let client = self.build_client(request)?;
        // On failure the client and any partial response are dropped here
        let (reader, status) = self.send(&client, request).await?;
        info!("Stream opened: {} {} -> HTTP {}", request.method, request.endpoint(), status);
        Ok(ConnectionHandle::with_client(client, reader, status))
    }

    async fn reopen_reader(
        &self,
        handle: &mut ConnectionHandle,
        request: &RequestDescriptor,
    ) -> Result<(), StreamError> {
        handle.release_reader();

        let client = match handle.client() {
            Some(client) => client.clone(),
            None => self.build_client(request)?,
        };
        let (reader, status) = self.send(&client, request).await?;
        info!("Stream reader reopened -> HTTP {}", status);
        handle.replace_reader(reader, status);
        Ok(())
    }
}
