// ABOUTME: Core library for stopmo, containing domain types shared by every crate.
// ABOUTME: Defines manifest entries, button events, the cadence ramp, and edit scripts.

pub mod cadence;
pub mod event;
pub mod model;
pub mod script;

pub use cadence::{CadenceError, RampCurve};
pub use event::{ButtonEvent, EventKind, UnknownEventKind};
pub use model::{DEFAULT_SESSION, FrameFormat, ManifestEntry, frame_file_name};
pub use script::{EditScript, ScriptEntry};
