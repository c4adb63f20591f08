//! Single-slot fragmented-message accumulator, grounded on the `FragmentedMessage`
//! bookkeeping in the teacher's `read.rs::poll_messages`. Control frames bypass
//! this entirely — they interleave freely with an in-progress fragment sequence.

use crate::error::Error;
use crate::message::{FragmentKind, WsMessage};

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Empty,
    Occupied { kind: FragmentKind, fragments: Vec<u8> },
}

pub struct Reassembler {
    slot: Slot,
    max_message_size: usize,
}

impl Reassembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            slot: Slot::Empty,
            max_message_size,
        }
    }

    /// Feeds one classified message through the accumulator. Control frames
    /// (`Ping`/`Pong`/`Close`) and whole `Text`/`Binary` messages pass through
    /// untouched. `Fragment`/`Continuation`/`Finish` are folded; `Finish` yields
    /// the reassembled `Text`/`Binary` message.
    pub fn feed(&mut self, message: WsMessage) -> Result<Option<WsMessage>, Error> {
        match message {
            WsMessage::Fragment(kind, payload) => match &self.slot {
                Slot::Empty => {
                    self.check_size(payload.len())?;
                    self.slot = Slot::Occupied {
                        kind,
                        fragments: payload,
                    };
                    Ok(None)
                }
                Slot::Occupied { .. } => Err(Error::FragmentedInProgress),
            },
            WsMessage::Continuation(payload) => {
                let max_message_size = self.max_message_size;
                match &mut self.slot {
                    Slot::Empty => Err(Error::InvalidContinuationFrame),
                    Slot::Occupied { fragments, .. } => {
                        if fragments.len() + payload.len() > max_message_size {
                            return Err(Error::MaxMessageSize);
                        }
                        fragments.extend_from_slice(&payload);
                        Ok(None)
                    }
                }
            }
            WsMessage::Finish(payload) => match std::mem::replace(&mut self.slot, Slot::Empty) {
                Slot::Empty => Err(Error::InvalidContinuationFrame),
                Slot::Occupied { kind, mut fragments } => {
                    self.check_size(fragments.len() + payload.len())?;
                    fragments.extend_from_slice(&payload);
                    Ok(Some(match kind {
                        FragmentKind::Text => {
                            let text =
                                String::from_utf8(fragments).map_err(|_| Error::InvalidUtf8)?;
                            WsMessage::Text(text)
                        }
                        FragmentKind::Binary => WsMessage::Binary(fragments),
                    }))
                }
            },
            other => Ok(Some(other)),
        }
    }

    fn check_size(&self, len: usize) -> Result<(), Error> {
        if len > self.max_message_size {
            return Err(Error::MaxMessageSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_fragmented_binary() {
        let mut r = Reassembler::new(1 << 20);
        assert_eq!(
            r.feed(WsMessage::Fragment(FragmentKind::Binary, vec![1, 2])).unwrap(),
            None
        );
        assert_eq!(r.feed(WsMessage::Continuation(vec![3])).unwrap(), None);
        assert_eq!(
            r.feed(WsMessage::Finish(vec![4])).unwrap(),
            Some(WsMessage::Binary(vec![1, 2, 3, 4]))
        );
    }

    #[test]
    fn test_control_frames_interleave_freely() {
        let mut r = Reassembler::new(1 << 20);
        r.feed(WsMessage::Fragment(FragmentKind::Binary, vec![1, 2])).unwrap();
        assert_eq!(
            r.feed(WsMessage::Ping(None)).unwrap(),
            Some(WsMessage::Ping(None))
        );
        r.feed(WsMessage::Continuation(vec![3])).unwrap();
        assert_eq!(
            r.feed(WsMessage::Finish(vec![4])).unwrap(),
            Some(WsMessage::Binary(vec![1, 2, 3, 4]))
        );
    }

    #[test]
    fn test_double_fragment_start_is_protocol_error() {
        let mut r = Reassembler::new(1 << 20);
        r.feed(WsMessage::Fragment(FragmentKind::Text, vec![1])).unwrap();
        assert!(matches!(
            r.feed(WsMessage::Fragment(FragmentKind::Text, vec![2])),
            Err(Error::FragmentedInProgress)
        ));
    }

    #[test]
    fn test_continuation_without_start_is_protocol_error() {
        let mut r = Reassembler::new(1 << 20);
        assert!(matches!(
            r.feed(WsMessage::Continuation(vec![1])),
            Err(Error::InvalidContinuationFrame)
        ));
        assert!(matches!(
            r.feed(WsMessage::Finish(vec![1])),
            Err(Error::InvalidContinuationFrame)
        ));
    }

    #[test]
    fn test_whole_message_passes_through() {
        let mut r = Reassembler::new(1 << 20);
        assert_eq!(
            r.feed(WsMessage::Text("hi".to_string())).unwrap(),
            Some(WsMessage::Text("hi".to_string()))
        );
    }

    #[test]
    fn test_exceeding_max_message_size_fails() {
        let mut r = Reassembler::new(4);
        r.feed(WsMessage::Fragment(FragmentKind::Binary, vec![1, 2, 3])).unwrap();
        assert!(matches!(
            r.feed(WsMessage::Continuation(vec![4, 5])),
            Err(Error::MaxMessageSize)
        ));
    }
}
