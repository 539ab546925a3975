//! daybook — an embeddable reservation booking and availability engine.
//!
//! Providers publish a per-day availability calendar and a daily capacity.
//! Requesters book inclusive date ranges; reservations move through a
//! role-gated state machine (Pending → Accepted/Rejected/Canceled,
//! Accepted → Canceled/Completed). All state lives in memory and is made
//! durable through an append-only WAL replayed on startup.

pub mod audit;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use config::EngineConfig;
pub use engine::{Engine, EngineError, ReservationAction};
pub use model::{
    Actor, CanceledBy, DateRange, NewReservation, Reservation, ReservationId, ReservationStatus,
    Role,
};
