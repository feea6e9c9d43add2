use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of server-pushed notification events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An expert applied to one of the institution's projects.
    NewApplication,
    ApplicationStatusChanged,
    BookingCreated,
    BookingUpdated,
    /// A project matching the expert's profile was posted.
    NewProjectAvailable,
    ExpertSelectedWithBooking,
    ExpertInterestShown,
    MovedToInterview,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 8] = [
        NotificationKind::NewApplication,
        NotificationKind::ApplicationStatusChanged,
        NotificationKind::BookingCreated,
        NotificationKind::BookingUpdated,
        NotificationKind::NewProjectAvailable,
        NotificationKind::ExpertSelectedWithBooking,
        NotificationKind::ExpertInterestShown,
        NotificationKind::MovedToInterview,
    ];

    /// The event name used on the wire.
    pub fn event_name(self) -> &'static str {
        match self {
            NotificationKind::NewApplication => "new_application",
            NotificationKind::ApplicationStatusChanged => "application_status_changed",
            NotificationKind::BookingCreated => "booking_created",
            NotificationKind::BookingUpdated => "booking_updated",
            NotificationKind::NewProjectAvailable => "new_project_available",
            NotificationKind::ExpertSelectedWithBooking => "expert_selected_with_booking",
            NotificationKind::ExpertInterestShown => "expert_interest_shown",
            NotificationKind::MovedToInterview => "moved_to_interview",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.event_name() == name)
    }
}

/// A normalized notification as stored in the buffer.
///
/// Only the contextual fields the kind actually carries are populated.
/// `received_at` is stamped on arrival; the server sends no timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub project_title: Option<String>,
    pub expert_name: Option<String>,
    pub institution_name: Option<String>,
    pub status: Option<String>,
    pub project_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Notification {
    /// A bare notification with no contextual fields.
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            project_title: None,
            expert_name: None,
            institution_name: None,
            status: None,
            project_id: None,
            received_at: Utc::now(),
        }
    }
}
