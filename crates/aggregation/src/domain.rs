mod aggregation_service;
mod event_query;

pub use aggregation_service::*;
pub use event_query::*;
