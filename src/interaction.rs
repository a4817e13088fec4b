//! Synthetic input against page elements.
//!
//! The application's click handler may listen for any of several event
//! families, so the simulator walks a priority ladder instead of assuming
//! one. Success here means "events were dispatched", not "the handler ran";
//! correctness is verified downstream by drawer-open and content checks.

use tracing::{debug, warn};

use crate::element::{InputEvent, PageElement};

/// Fire a best-effort activation sequence at `element`.
///
/// Native activation is tried first and short-circuits the ladder. On
/// touch-primary runtimes the touch and pointer emulation runs as backup
/// before the final mouse-event fallback. Returns false only when the
/// element no longer accepts any input at all.
pub fn simulate_click(element: &PageElement, touch_primary: bool) -> bool {
    element.scroll_into_view();
    element.focus();

    if element.activate() {
        return true;
    }
    debug!("native activation unavailable, dispatching synthetic events");

    if touch_primary {
        element.dispatch(InputEvent::TouchStart);
        element.dispatch(InputEvent::TouchEnd);
        element.dispatch(InputEvent::PointerDown);
        element.dispatch(InputEvent::PointerUp);
    }

    element.dispatch(InputEvent::MouseDown);
    element.dispatch(InputEvent::MouseUp);
    if element.dispatch(InputEvent::Click) {
        true
    } else {
        warn!("element refused every input event");
        false
    }
}
