use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Topic capacity exceeded: at most {max} topics can be live")]
    TopicCapacityExceeded { max: usize },

    #[error("Timed out creating topic: {0}")]
    TopicCreateTimeout(String),

    #[error("Log error: {0}")]
    Log(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Unknown partition {partition} for topic {topic}")]
    UnknownPartition { topic: String, partition: u32 },

    #[error("Invalid topic name: {0}")]
    InvalidTopic(String),

    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("Failed to serialize message: {0}")]
    SerializationError(String),

    #[error("Failed to deserialize message: {0}")]
    DeserializationError(String),

    #[error("Subscriber {0} is not keeping up")]
    SubscriberLagging(String),

    #[error("Subscriber {0} has gone away")]
    SubscriberClosed(String),

    #[error("Operation timeout")]
    Timeout,

    #[error("Broker is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::TopicCapacityExceeded { .. } => "topic_capacity_exceeded",
            Error::TopicCreateTimeout(_) => "topic_create_timeout",
            Error::Log(_) => "log_error",
            Error::UnknownTopic(_) => "unknown_topic",
            Error::UnknownPartition { .. } => "unknown_partition",
            Error::InvalidTopic(_) => "invalid_topic",
            Error::InvalidChannel(_) => "invalid_channel",
            Error::SerializationError(_) => "serialization_error",
            Error::DeserializationError(_) => "deserialization_error",
            Error::SubscriberLagging(_) => "subscriber_lagging",
            Error::SubscriberClosed(_) => "subscriber_closed",
            Error::Timeout => "timeout",
            Error::Closed => "closed",
            Error::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Whether retrying the same call later can succeed.
    ///
    /// The topic cap is never relieved while the process runs, so
    /// `TopicCapacityExceeded` is reported as permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TopicCreateTimeout(_)
                | Error::Log(_)
                | Error::SubscriberLagging(_)
                | Error::Timeout
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
