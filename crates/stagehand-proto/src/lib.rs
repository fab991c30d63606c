//! # Stagehand Proto
//!
//! Client bindings for the control protocol spoken by every
//! stagehand-managed process: a small capability set {Attach, Status, Quit,
//! Close, Port} behind the [`JobService`] trait, with two concrete
//! realizations:
//!
//! - [`GrpcJobService`] — a typed tonic client over a persistent channel,
//!   lazily established on first call and reused until closed.
//! - [`RestJobService`] — stateless HTTP/JSON, one request per call, no
//!   state beyond the target port.
//!
//! Jobs and the launcher only ever see the trait; the binding is chosen at
//! job construction time.

pub mod grpc;
pub mod rest;
pub mod service;

/// Generated protobuf/tonic types for the `jobcontrol` package.
pub mod pb {
    tonic::include_proto!("jobcontrol");
}

pub use grpc::GrpcJobService;
pub use rest::RestJobService;
pub use service::{JobAttach, JobService, JobStatusReport};
