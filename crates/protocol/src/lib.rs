mod document;
mod model;

pub use document::{BoardDocument, ExportDocument, MarkerSet, StoredBoard, EXPORT_VERSION};
pub use model::{
    BoardSummary, Group, IndividualPlacement, Marker, MarkerKind, Member, MemberDraft, MemberId,
    Point, Role, RoleCount, Stroke, TeamKey, UnknownTeam, DEFAULT_STROKE_COLOR, STROKE_WIDTH,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

impl Default for NoticeLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// User-facing message the UI shows as a toast or alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    #[serde(default)]
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiUpdate {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

impl UiUpdate {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            payload: None,
            notice: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }
}

pub mod events {
    pub const BOARD_CHANGED: &str = "board.changed";
    pub const ROSTER_CHANGED: &str = "roster.changed";
    pub const TEAMS_CHANGED: &str = "teams.changed";
    pub const DRAWING_CHANGED: &str = "drawing.changed";
    pub const BOARD_IMPORTED: &str = "board.imported";
    pub const REJECTED: &str = "rejected";
}
