//! Slipstream Client Roles
//!
//! Two of the three participant roles live here, chosen once at spawn by
//! constructing the matching type:
//!
//! - [`OwnedVehicle`] — the input-owning client. Simulates every move
//!   immediately, queues it until acknowledged, and reconciles against
//!   authoritative snapshots by hard-correcting and replaying the queue.
//! - [`RemoteVehicle`] — a third-party observer. Never runs the force model;
//!   renders a pose interpolated along a Hermite spline between sparse
//!   snapshots.
//!
//! The third role (the authority itself) lives in the server crate. All
//! three share the step / on-snapshot vocabulary, so an embedding drives
//! them uniformly from any fixed-timestep loop, engine callback, or test
//! harness. Nothing here blocks on the network: stepping returns the move to
//! send, and corrections land whenever the replication channel delivers.

#![deny(unsafe_code)]

pub mod interpolator;
pub mod pending;
pub mod predictor;
pub mod spline;

pub use interpolator::RemoteVehicle;
pub use pending::PendingMoves;
pub use predictor::OwnedVehicle;
pub use spline::HermiteSpline;
