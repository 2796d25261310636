// ABOUTME: Maps raw button tokens to event kinds.
// ABOUTME: Accepts event names in any case plus the BTN_A/B/C codes sent by the button board.

use stopmo_core::EventKind;

/// Translate one token into an event kind, or `None` if it means nothing.
pub fn map_token(token: &str) -> Option<EventKind> {
    let token = token.trim();
    match token {
        "BTN_A" => return Some(EventKind::Capture),
        "BTN_B" => return Some(EventKind::Play),
        "BTN_C" => return Some(EventKind::Reset),
        _ => {}
    }
    EventKind::ALL
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(token))
}
