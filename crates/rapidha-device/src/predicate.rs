//! Frame matching and handling traits.
//!
//! Both traits are implemented for plain closures, so most callers never
//! name them:
//!
//! ```
//! use rapidha_device::predicate::{self, FramePredicate};
//! use rapidha_frame::Frame;
//!
//! let is_sync = predicate::command(0x5521);
//! assert!(is_sync.matches(&Frame::new(0x5521, 0, vec![0x00, 0x02])));
//!
//! let has_payload = |frame: &Frame| !frame.payload.is_empty();
//! assert!(!has_payload.matches(&Frame::new(0x5580, 1, Vec::new())));
//! ```

use rapidha_frame::Frame;

/// Decides whether a frame is of interest. Must be side-effect free.
pub trait FramePredicate: Send + Sync {
    fn matches(&self, frame: &Frame) -> bool;
}

impl<F> FramePredicate for F
where
    F: Fn(&Frame) -> bool + Send + Sync,
{
    fn matches(&self, frame: &Frame) -> bool {
        self(frame)
    }
}

/// Receives frames on the reader thread. Must return quickly.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, name: &str, frame: &Frame);
}

impl<F> FrameHandler for F
where
    F: Fn(&str, &Frame) + Send + Sync,
{
    fn handle(&self, name: &str, frame: &Frame) {
        self(name, frame)
    }
}

/// Matches every frame.
pub fn any() -> impl FramePredicate + Clone {
    |_: &Frame| true
}

/// Matches frames with the given command id.
pub fn command(command_id: u16) -> impl FramePredicate + Clone {
    move |frame: &Frame| frame.command_id == command_id
}

/// Matches frames with any of the given command ids.
pub fn commands(command_ids: &[u16]) -> impl FramePredicate + Clone {
    let ids = command_ids.to_vec();
    move |frame: &Frame| ids.contains(&frame.command_id)
}

/// Matches frames echoing the given sequence number.
pub fn sequence(sequence: u8) -> impl FramePredicate + Clone {
    move |frame: &Frame| frame.sequence == sequence
}

/// Matches a reply with the given command id that echoes `sequence`.
pub fn reply(command_id: u16, sequence: u8) -> impl FramePredicate + Clone {
    move |frame: &Frame| frame.command_id == command_id && frame.sequence == sequence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(command_id: u16, sequence: u8) -> Frame {
        Frame::new(command_id, sequence, Vec::new())
    }

    #[test]
    fn builtin_predicates() {
        assert!(any().matches(&frame(0x1234, 0)));
        assert!(command(0x0109).matches(&frame(0x0109, 3)));
        assert!(!command(0x0109).matches(&frame(0x0108, 3)));
        assert!(commands(&[0x5580, 0x55E0]).matches(&frame(0x55E0, 0)));
        assert!(!commands(&[]).matches(&frame(0x55E0, 0)));
        assert!(sequence(7).matches(&frame(0x5580, 7)));
        assert!(reply(0x5580, 7).matches(&frame(0x5580, 7)));
        assert!(!reply(0x5580, 7).matches(&frame(0x5580, 8)));
    }

    #[test]
    fn closures_are_handlers() {
        let seen = std::sync::Mutex::new(Vec::new());
        let handler = |name: &str, frame: &Frame| {
            seen.lock().unwrap().push((name.to_string(), frame.command_id));
        };
        handler.handle("printall", &frame(0x0109, 1));
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![("printall".to_string(), 0x0109)]
        );
    }
}
