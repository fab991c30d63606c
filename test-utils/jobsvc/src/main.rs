//! Controllable managed process for exercising the stagehand supervisor.
//!
//! Serves the job control protocol over either binding and lets failure
//! modes be scripted from the command line: delayed readiness, ignored
//! quit requests, and custom exit codes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use stagehand_proto::pb;
use stagehand_proto::pb::job_control_server::{JobControl, JobControlServer};
use stagehand_proto::{JobAttach, JobStatusReport};

/// Test process for stagehand end-to-end exercise.
#[derive(Parser, Debug)]
#[command(name = "jobsvc")]
#[command(about = "Controllable process speaking the job control protocol", long_about = None)]
struct Args {
    /// Control endpoint port
    #[arg(long)]
    port: u16,

    /// Binding to serve: grpc or http
    #[arg(long, default_value = "grpc")]
    protocol: String,

    /// Command line to report on attach (defaults to the real one)
    #[arg(long)]
    command: Option<String>,

    /// Seconds after startup during which status reports not-ready
    #[arg(long, default_value = "0")]
    not_ready_for: u64,

    /// Acknowledge quit requests but never exit
    #[arg(long)]
    ignore_quit: bool,

    /// Exit code to use when quitting
    #[arg(long, default_value = "0")]
    exit_code: i32,

    /// Exit on our own after this many seconds (0 = run until quit)
    #[arg(long, default_value = "0")]
    run_duration: u64,
}

struct JobState {
    started: Instant,
    not_ready_for: Duration,
    command: String,
    ignore_quit: bool,
    quit_tx: mpsc::Sender<()>,
}

impl JobState {
    fn attach_reply(&self) -> JobAttach {
        JobAttach {
            pid: std::process::id(),
            command: self.command.clone(),
        }
    }

    fn status_reply(&self) -> JobStatusReport {
        JobStatusReport {
            ready: self.started.elapsed() >= self.not_ready_for,
        }
    }

    async fn handle_quit(&self) {
        if self.ignore_quit {
            info!("quit requested, ignoring as configured");
            return;
        }
        info!("quit requested, shutting down");
        let _ = self.quit_tx.send(()).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    info!("starting jobsvc with args: {:?}", args);

    let (quit_tx, mut quit_rx) = mpsc::channel(1);
    let state = Arc::new(JobState {
        started: Instant::now(),
        not_ready_for: Duration::from_secs(args.not_ready_for),
        command: args
            .command
            .clone()
            .unwrap_or_else(|| std::env::args().collect::<Vec<_>>().join(" ")),
        ignore_quit: args.ignore_quit,
        quit_tx,
    });

    match args.protocol.as_str() {
        "grpc" => serve_grpc(args.port, Arc::clone(&state)),
        "http" => serve_http(args.port, Arc::clone(&state)).await?,
        other => anyhow::bail!("unknown protocol: {}", other),
    }

    let run_duration = args.run_duration;
    tokio::select! {
        _ = quit_rx.recv() => {
            // Give the in-flight quit response a moment to flush.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        _ = tokio::time::sleep(Duration::from_secs(run_duration)), if run_duration > 0 => {
            info!("run duration elapsed, exiting");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, exiting");
        }
    }

    std::process::exit(args.exit_code);
}

// -- gRPC binding --

struct GrpcJob {
    state: Arc<JobState>,
}

#[tonic::async_trait]
impl JobControl for GrpcJob {
    async fn attach(
        &self,
        _request: tonic::Request<pb::Empty>,
    ) -> std::result::Result<tonic::Response<pb::AttachReply>, tonic::Status> {
        let reply = self.state.attach_reply();
        Ok(tonic::Response::new(pb::AttachReply {
            pid: reply.pid,
            command: reply.command,
        }))
    }

    async fn status(
        &self,
        _request: tonic::Request<pb::Empty>,
    ) -> std::result::Result<tonic::Response<pb::StatusReply>, tonic::Status> {
        Ok(tonic::Response::new(pb::StatusReply {
            ready: self.state.status_reply().ready,
        }))
    }

    async fn quit(
        &self,
        _request: tonic::Request<pb::Empty>,
    ) -> std::result::Result<tonic::Response<pb::Empty>, tonic::Status> {
        self.state.handle_quit().await;
        Ok(tonic::Response::new(pb::Empty {}))
    }
}

fn serve_grpc(port: u16, state: Arc<JobState>) {
    let addr = format!("127.0.0.1:{}", port).parse().unwrap();
    tokio::spawn(async move {
        info!("serving gRPC job control on {}", addr);
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(JobControlServer::new(GrpcJob { state }))
            .serve(addr)
            .await
        {
            warn!("gRPC server failed: {}", e);
        }
    });
}

// -- HTTP/JSON binding --

async fn serve_http(port: u16, state: Arc<JobState>) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("serving HTTP job control on port {}", port);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service =
                    service_fn(move |req| handle_http(req, Arc::clone(&state)));
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    warn!("connection error: {}", e);
                }
            });
        }
    });
    Ok(())
}

async fn handle_http(
    request: Request<Incoming>,
    state: Arc<JobState>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match (request.method(), request.uri().path()) {
        (&Method::GET, "/job/attach.json") => json_response(&state.attach_reply()),
        (&Method::GET, "/job/status.json") => json_response(&state.status_reply()),
        (&Method::POST, "/job/quit") => {
            state.handle_quit().await;
            Response::new(Full::new(Bytes::from_static(b"ok")))
        }
        _ => {
            let mut not_found = Response::new(Full::new(Bytes::new()));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            not_found
        }
    };
    Ok(response)
}

fn json_response(value: &impl serde::Serialize) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).expect("serializable reply");
    Response::builder()
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("valid response")
}
