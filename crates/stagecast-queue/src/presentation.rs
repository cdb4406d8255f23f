use stagecast_protocol::notifications::{
    LIVE_UPDATED, NEW_MESSAGE, NEW_POLL, NEW_SCREENSHOT, OVERLAY_MESSAGE, OVERLAY_MESSAGE_END,
    OVERLAY_POLL, OVERLAY_POLL_END, ROOM_OVERLAY_MESSAGES, ROOM_OVERLAY_POLLS,
};

use crate::types::EventKind;

/// Which notifications an event kind produces and where they go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Presentation {
    /// `None` addresses the default audience.
    pub room: Option<&'static str>,
    pub start: &'static str,
    /// Redundant copy for the default audience.
    pub generic: Option<&'static str>,
    pub end: Option<&'static str>,
}

pub(crate) fn presentation(kind: EventKind) -> Option<Presentation> {
    match kind {
        EventKind::Message => Some(Presentation {
            room: Some(ROOM_OVERLAY_MESSAGES),
            start: OVERLAY_MESSAGE,
            generic: Some(NEW_MESSAGE),
            end: Some(OVERLAY_MESSAGE_END),
        }),
        EventKind::Poll => Some(Presentation {
            room: Some(ROOM_OVERLAY_POLLS),
            start: OVERLAY_POLL,
            generic: Some(NEW_POLL),
            end: Some(OVERLAY_POLL_END),
        }),
        // emitted once to everyone, nothing to take down afterwards
        EventKind::Screenshot => Some(Presentation {
            room: None,
            start: NEW_SCREENSHOT,
            generic: None,
            end: None,
        }),
        EventKind::SessionUpdate => Some(Presentation {
            room: None,
            start: LIVE_UPDATED,
            generic: None,
            end: None,
        }),
        EventKind::Stop => None,
    }
}
