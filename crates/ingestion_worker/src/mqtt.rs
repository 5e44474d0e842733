pub(crate) mod subscriber;
mod topic;

pub use subscriber::{MqttSubscriberConfig, run_mqtt_subscriber};
pub use topic::{ParsedTopic, parse_topic};
