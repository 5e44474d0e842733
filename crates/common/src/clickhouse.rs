mod client;
mod telemetry_event_repository;

pub use client::*;
pub use telemetry_event_repository::*;
