mod in_memory_telemetry_event_repository;
mod result;
mod sensor_rewarder;
mod telemetry_event;

pub use in_memory_telemetry_event_repository::*;
pub use result::*;
pub use sensor_rewarder::*;
pub use telemetry_event::*;
