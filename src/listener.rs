//! Event sinks

use crate::uid::Uid;

/// Receives the driver's events
///
/// Every method defaults to doing nothing, so implementors only override what they care about.
/// `()` is the listener that ignores everything.
pub trait Listener {
    /// A tag, not present before, was selected
    fn on_tag_appeared(&mut self, _uid: &Uid) {}

    /// The present tag missed enough consecutive cycles
    fn on_tag_removed(&mut self, _uid: &Uid) {}

    /// Identity checks started failing (`false`) or passing again (`true`)
    fn on_health_status_changed(&mut self, _ok: bool) {}

    /// Whether the watched `expected` UID is the one present changed
    fn on_uid_match(&mut self, _expected: &Uid, _matched: bool) {}

    /// Raw RF amplitude measured before a poll
    fn on_field_strength(&mut self, _amplitude: u8) {}

    /// NDEF message read from a newly appeared Type 2 tag
    fn on_tag_content(&mut self, _uid: &Uid, _ndef: &[u8]) {}
}

impl Listener for () {}

impl<'a, L> Listener for &'a mut L
where
    L: Listener + ?Sized,
{
    fn on_tag_appeared(&mut self, uid: &Uid) {
        (**self).on_tag_appeared(uid)
    }

    fn on_tag_removed(&mut self, uid: &Uid) {
        (**self).on_tag_removed(uid)
    }

    fn on_health_status_changed(&mut self, ok: bool) {
        (**self).on_health_status_changed(ok)
    }

    fn on_uid_match(&mut self, expected: &Uid, matched: bool) {
        (**self).on_uid_match(expected, matched)
    }

    fn on_field_strength(&mut self, amplitude: u8) {
        (**self).on_field_strength(amplitude)
    }

    fn on_tag_content(&mut self, uid: &Uid, ndef: &[u8]) {
        (**self).on_tag_content(uid, ndef)
    }
}
