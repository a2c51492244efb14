//! crates/push_channel/src/protocol.rs
//!
//! Defines the push-channel message protocol between the browser client and
//! the API server, shared by both sides so the frames cannot drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire representation of one notification. Also reused as the REST list
/// payload so push and backfill carry identical records.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NotificationDto {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    /// One of `info`, `success`, `warning`, `error`.
    pub kind: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `GET /notifications/unread-count`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnreadCountBody {
    pub count: i64,
}

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Joins the user's room. Must carry the authenticated user's own id;
    /// joining a new room implicitly leaves the previous one.
    Join { user_id: Uuid },

    /// Acknowledges a server frame that carried an `ack_id`.
    Ack { ack_id: u64 },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
/// Frames carrying an `ack_id` expect a `ClientFrame::Ack` in response; the
/// server logs (but never retries) a missing acknowledgment.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Confirms the socket was added to the user's room.
    Joined { user_id: Uuid },

    /// Reports an error to the client (e.g. a rejected join).
    Error { message: String },

    /// A single newly created notification.
    NewNotification {
        ack_id: u64,
        notification: NotificationDto,
    },

    /// The user's full notification list, newest first, capped at 50.
    Notifications {
        ack_id: u64,
        items: Vec<NotificationDto>,
    },

    /// The user's current unread count.
    UnreadCount { ack_id: u64, count: i64 },
}
