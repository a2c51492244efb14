pub mod client;
pub mod protocol;

pub use client::{
    backoff_delay, retry_delay, Phase, PushClient, PushClientConfig, PushError, PushEvents,
    PushShutdown,
};
pub use protocol::{ClientFrame, NotificationDto, ServerFrame, UnreadCountBody};
