//! HTTP/JSON binding of the control protocol.
//!
//! Stateless: every operation is a single request against
//! `http://localhost:<port>/job/...` and no connection state is kept
//! between calls. Only HTTP 200 counts as success; any other status is a
//! connection-class error.

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use stagehand_common::{JobError, Result};
use tokio::time::timeout;
use tracing::debug;

use crate::service::{JobAttach, JobService, JobStatusReport};

/// Stateless HTTP/JSON adapter for one managed process.
pub struct RestJobService {
    port: u16,
}

impl RestJobService {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    fn connection_error(&self, err: impl std::fmt::Display) -> JobError {
        JobError::connection(self.port, err.to_string())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        deadline: Duration,
    ) -> Result<Bytes> {
        let uri: Uri = format!("http://localhost:{}/job/{}", self.port, path)
            .parse()
            .map_err(|e| self.connection_error(e))?;
        debug!("requesting {} {}", method, uri);

        let client = Client::builder(TokioExecutor::new()).build_http();
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Empty::<Bytes>::new())
            .map_err(|e| self.connection_error(e))?;

        let response = timeout(deadline, client.request(request))
            .await
            .map_err(|_| self.connection_error("request timed out"))?
            .map_err(|e| self.connection_error(e))?;

        if response.status() != StatusCode::OK {
            return Err(self.connection_error(format!(
                "failed with status: {} (only 200 is accepted)",
                response.status()
            )));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| self.connection_error(e))?
            .to_bytes();
        Ok(body)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        deadline: Duration,
    ) -> Result<T> {
        let body = self.request(Method::GET, path, deadline).await?;
        serde_json::from_slice(&body).map_err(|e| self.connection_error(e))
    }
}

#[async_trait]
impl JobService for RestJobService {
    async fn attach(&self, deadline: Duration) -> Result<JobAttach> {
        self.get_json("attach.json", deadline).await
    }

    async fn status(&self, deadline: Duration) -> Result<JobStatusReport> {
        self.get_json("status.json", deadline).await
    }

    async fn quit(&self, deadline: Duration) -> Result<()> {
        self.request(Method::POST, "quit", deadline).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Nothing held between calls.
        Ok(())
    }

    fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serve canned HTTP responses on an ephemeral port. Every accepted
    /// connection gets `body` back with the given status line.
    async fn serve_canned(status_line: &'static str, body: &'static str) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn attach_parses_json_body() {
        let port = serve_canned("200 OK", r#"{"pid": 123, "command": "node vite.js"}"#).await;
        let service = RestJobService::new(port);
        let attach = service.attach(Duration::from_secs(5)).await.unwrap();
        assert_eq!(attach.pid, 123);
        assert_eq!(attach.command, "node vite.js");
    }

    #[tokio::test]
    async fn status_parses_ready_flag() {
        let port = serve_canned("200 OK", r#"{"ready": false}"#).await;
        let service = RestJobService::new(port);
        let report = service.status(Duration::from_secs(5)).await.unwrap();
        assert!(!report.ready);
    }

    #[tokio::test]
    async fn non_200_status_is_connection_error() {
        let port = serve_canned("503 Service Unavailable", "down").await;
        let service = RestJobService::new(port);
        let err = service.status(Duration::from_secs(5)).await.unwrap_err();
        match err {
            JobError::Connection { reason, .. } => {
                assert!(reason.contains("only 200 is accepted"), "reason: {reason}");
            }
            other => panic!("expected connection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let service = RestJobService::new(port);
        let err = service.quit(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, JobError::Connection { .. }));
    }

    #[tokio::test]
    async fn malformed_json_is_connection_error() {
        let port = serve_canned("200 OK", "not json").await;
        let service = RestJobService::new(port);
        assert!(service.attach(Duration::from_secs(5)).await.is_err());
    }
}
