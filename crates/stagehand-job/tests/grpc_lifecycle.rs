//! End-to-end lifecycle against a real in-process gRPC control endpoint.

use std::sync::Arc;
use std::time::Duration;

use stagehand_common::{Console, JobError, MemoryConsole};
use stagehand_job::{AttachState, Job, JobSpec, JobTimings, Readiness};
use stagehand_process::{force_kill, process_exists};
use stagehand_proto::pb;
use stagehand_proto::pb::job_control_server::{JobControl, JobControlServer};
use stagehand_proto::GrpcJobService;
use tokio_stream::wrappers::TcpListenerStream;

/// Control endpoint for a victim process: reports the victim's pid and
/// kills it when asked to quit, standing in for a process that obeys a
/// graceful shutdown request.
struct VictimControl {
    pid: u32,
    command: String,
}

#[tonic::async_trait]
impl JobControl for VictimControl {
    async fn attach(
        &self,
        _request: tonic::Request<pb::Empty>,
    ) -> Result<tonic::Response<pb::AttachReply>, tonic::Status> {
        Ok(tonic::Response::new(pb::AttachReply {
            pid: self.pid,
            command: self.command.clone(),
        }))
    }

    async fn status(
        &self,
        _request: tonic::Request<pb::Empty>,
    ) -> Result<tonic::Response<pb::StatusReply>, tonic::Status> {
        Ok(tonic::Response::new(pb::StatusReply { ready: true }))
    }

    async fn quit(
        &self,
        _request: tonic::Request<pb::Empty>,
    ) -> Result<tonic::Response<pb::Empty>, tonic::Status> {
        let _ = force_kill(self.pid);
        Ok(tonic::Response::new(pb::Empty {}))
    }
}

fn serve(listener: tokio::net::TcpListener, control: VictimControl) {
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(JobControlServer::new(control))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
}

fn spawn_victim() -> u32 {
    let mut child = tokio::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .unwrap();
    let pid = child.id().unwrap();
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    pid
}

fn fast_timings() -> JobTimings {
    JobTimings {
        attach_timeout: Duration::from_secs(2),
        attach_backoff: Duration::from_millis(10),
        start_attach_attempts: 2,
        settle_delay: Duration::from_millis(10),
        quit_timeout: Duration::from_secs(2),
        graceful_wait: Duration::from_secs(3),
        kill_wait: Duration::from_secs(3),
        status_timeout: Duration::from_secs(2),
        status_ttl: Duration::from_millis(100),
        exit_poll_interval: Duration::from_millis(10),
    }
}

fn spec(port: u16) -> JobSpec {
    JobSpec {
        name: "victim".to_string(),
        color: 24,
        command: "sleep".to_string(),
        args: vec!["30".to_string()],
        build: None,
        port,
    }
}

#[tokio::test]
async fn attach_probe_and_graceful_stop_over_grpc() {
    let victim = spawn_victim();
    // Bind first: the command line the control reports includes the port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    let spec = spec(port);
    serve(
        listener,
        VictimControl {
            pid: victim,
            command: spec.command_line(),
        },
    );

    let console = Arc::new(MemoryConsole::new());
    let mut job = Job::new(
        spec,
        fast_timings(),
        Box::new(GrpcJobService::new(port)),
        Arc::clone(&console) as Arc<dyn Console>,
    );

    job.attach_or_start().await.unwrap();
    assert!(job.is_attached());
    assert_eq!(job.pid(), Some(victim));
    assert_eq!(job.state(), AttachState::Attached(Readiness::Ready));
    assert!(job.warnings().is_empty(), "warnings: {:?}", job.warnings());

    job.stop().await.unwrap();
    assert!(!job.is_attached());
    assert!(job.errors().is_empty(), "errors: {:?}", job.errors());
    assert!(!process_exists(victim).unwrap());
    // Graceful quit sufficed; the forceful phase never ran.
    assert!(!console.contains("Forcefully quitting"));
}

#[tokio::test]
async fn attach_or_start_falls_back_and_surfaces_failure() {
    // Nothing listens on this port, and the spawned placeholder command
    // exits immediately, so both the fast path and the fallback fail.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let console = Arc::new(MemoryConsole::new());
    let mut job = Job::new(
        spec(port),
        fast_timings(),
        Box::new(GrpcJobService::new(port)),
        Arc::clone(&console) as Arc<dyn Console>,
    );

    let err = job.attach_or_start().await.unwrap_err();
    assert!(matches!(err, JobError::Connection { .. }));
    assert!(!job.is_attached());
    assert!(job.errors().iter().any(|e| e.contains("attach:")));
    assert!(console.contains("Unable to attach to an already running job"));
}
