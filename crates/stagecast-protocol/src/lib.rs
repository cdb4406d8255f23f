//! `stagecast-protocol`: what goes over the wire to overlays and admin pages.

pub mod frames;
pub mod notifications;

pub use frames::{ErrorShape, EventFrame, InboundFrame};
pub use notifications::{EndNotice, StartNotice};
