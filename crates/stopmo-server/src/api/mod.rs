// ABOUTME: API module containing all HTTP handler functions for the stopmo REST surface.
// ABOUTME: Organized into sub-modules for frames, video builds, and live events.

pub mod events;
pub mod frames;
pub mod video;

use serde::Deserialize;

/// `?session=` query parameter accepted by every call.
#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session: Option<String>,
}
