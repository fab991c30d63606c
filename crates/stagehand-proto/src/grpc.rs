//! gRPC binding of the control protocol.
//!
//! Holds one persistent channel per adapter, established lazily on the
//! first call and reused until [`JobService::close`] drops it. The channel
//! itself connects in the background; per-call deadlines come from the
//! explicit timeouts on each operation.

use std::time::Duration;

use async_trait::async_trait;
use stagehand_common::{JobError, Result};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::pb;
use crate::pb::job_control_client::JobControlClient;
use crate::service::{JobAttach, JobService, JobStatusReport};

/// Persistent-connection RPC adapter for one managed process.
pub struct GrpcJobService {
    port: u16,
    client: Mutex<Option<JobControlClient<Channel>>>,
}

impl GrpcJobService {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            client: Mutex::new(None),
        }
    }

    /// Return the cached client, dialing lazily on first use.
    ///
    /// The client is a cheap handle over a shared channel, so cloning it out
    /// of the mutex keeps the lock scope minimal.
    async fn client(&self) -> Result<JobControlClient<Channel>> {
        let mut guard = self.client.lock().await;
        if guard.is_none() {
            let target = format!("http://localhost:{}", self.port);
            debug!("dialing job control endpoint {}", target);
            let endpoint = Endpoint::from_shared(target)
                .map_err(|e| JobError::connection(self.port, e.to_string()))?;
            *guard = Some(JobControlClient::new(endpoint.connect_lazy()));
        }
        Ok(guard.as_ref().unwrap().clone())
    }

    fn connection_error(&self, err: impl std::fmt::Display) -> JobError {
        JobError::connection(self.port, err.to_string())
    }
}

#[async_trait]
impl JobService for GrpcJobService {
    async fn attach(&self, deadline: Duration) -> Result<JobAttach> {
        let mut client = self.client().await?;
        let reply = timeout(deadline, client.attach(pb::Empty {}))
            .await
            .map_err(|_| self.connection_error("attach timed out"))?
            .map_err(|status| self.connection_error(status))?
            .into_inner();
        Ok(JobAttach {
            pid: reply.pid,
            command: reply.command,
        })
    }

    async fn status(&self, deadline: Duration) -> Result<JobStatusReport> {
        let mut client = self.client().await?;
        let reply = timeout(deadline, client.status(pb::Empty {}))
            .await
            .map_err(|_| self.connection_error("status timed out"))?
            .map_err(|status| self.connection_error(status))?
            .into_inner();
        Ok(JobStatusReport { ready: reply.ready })
    }

    async fn quit(&self, deadline: Duration) -> Result<()> {
        let mut client = self.client().await?;
        timeout(deadline, client.quit(pb::Empty {}))
            .await
            .map_err(|_| self.connection_error("quit timed out"))?
            .map_err(|status| self.connection_error(status))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.client.lock().await = None;
        Ok(())
    }

    fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::job_control_server::{JobControl, JobControlServer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::{Request, Response, Status};

    struct FakeJobControl {
        quits: Arc<AtomicUsize>,
    }

    #[tonic::async_trait]
    impl JobControl for FakeJobControl {
        async fn attach(
            &self,
            _request: Request<pb::Empty>,
        ) -> std::result::Result<Response<pb::AttachReply>, Status> {
            Ok(Response::new(pb::AttachReply {
                pid: 4242,
                command: "./fake-server --port=0".to_string(),
            }))
        }

        async fn status(
            &self,
            _request: Request<pb::Empty>,
        ) -> std::result::Result<Response<pb::StatusReply>, Status> {
            Ok(Response::new(pb::StatusReply { ready: true }))
        }

        async fn quit(
            &self,
            _request: Request<pb::Empty>,
        ) -> std::result::Result<Response<pb::Empty>, Status> {
            self.quits.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(pb::Empty {}))
        }
    }

    /// Serve a fake JobControl on an ephemeral port, returning the port.
    async fn serve_fake(quits: Arc<AtomicUsize>) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        let incoming = TcpListenerStream::new(listener);
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(JobControlServer::new(FakeJobControl { quits }))
                .serve_with_incoming(incoming)
                .await
                .unwrap();
        });
        port
    }

    #[tokio::test]
    async fn grpc_binding_round_trips_all_calls() {
        let quits = Arc::new(AtomicUsize::new(0));
        let port = serve_fake(Arc::clone(&quits)).await;
        let service = GrpcJobService::new(port);

        let attach = service.attach(Duration::from_secs(5)).await.unwrap();
        assert_eq!(attach.pid, 4242);
        assert_eq!(attach.command, "./fake-server --port=0");

        let status = service.status(Duration::from_secs(5)).await.unwrap();
        assert!(status.ready);

        service.quit(Duration::from_secs(5)).await.unwrap();
        assert_eq!(quits.load(Ordering::SeqCst), 1);

        service.close().await.unwrap();
        assert_eq!(service.port(), port);
    }

    #[tokio::test]
    async fn attach_against_dead_port_is_connection_error() {
        // Bind and immediately drop to find a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let service = GrpcJobService::new(port);
        let err = service.attach(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, JobError::Connection { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_reconnects() {
        let quits = Arc::new(AtomicUsize::new(0));
        let port = serve_fake(quits).await;
        let service = GrpcJobService::new(port);

        service.attach(Duration::from_secs(5)).await.unwrap();
        service.close().await.unwrap();
        service.close().await.unwrap();
        // A fresh channel is dialed on the next call.
        service.attach(Duration::from_secs(5)).await.unwrap();
    }
}
