mod ingestion_service;
mod payload;

pub use ingestion_service::*;
pub use payload::*;
