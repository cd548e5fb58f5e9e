//! The extension hook: plugins consulted for messages the client has no transition for. An
//! extension can keep its own bookkeeping and may update the channel roster; it runs inside the
//! client task and must not block.

use crate::roster::Roster;

use libminnow_wire as wire;

use std::panic::{self, AssertUnwindSafe};

/// What an extension did with a message.
#[derive(Debug, PartialEq, Eq)]
pub enum ExtensionOutcome {
    /// The message was consumed; no `Unrecognized` event will be emitted for it.
    Handled,
    /// The extension was not interested; the state is unchanged.
    Unchanged,
}

/// A plugin invoked for every message not matched by the client's own dispatch, in registration
/// order, until one returns [`ExtensionOutcome::Handled`].
pub trait Extension: Send {
    fn handle(&mut self, msg: &wire::Msg, roster: &mut Roster) -> ExtensionOutcome;
}

pub(crate) struct Extensions {
    exts: Vec<Box<dyn Extension>>,
}

impl Extensions {
    pub(crate) fn new(exts: Vec<Box<dyn Extension>>) -> Extensions {
        Extensions { exts }
    }

    /// Run the registered extensions against a message. A panicking extension is caught and
    /// treated as `Unchanged`.
    pub(crate) fn run(&mut self, msg: &wire::Msg, roster: &mut Roster) -> bool {
        for ext in &mut self.exts {
            match panic::catch_unwind(AssertUnwindSafe(|| ext.handle(msg, roster))) {
                Ok(ExtensionOutcome::Handled) => return true,
                Ok(ExtensionOutcome::Unchanged) => {}
                Err(_) => warn!("extension panicked on {:?}; treating as unchanged", msg.cmd),
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WallopsLogger;

    impl Extension for WallopsLogger {
        fn handle(&mut self, msg: &wire::Msg, roster: &mut Roster) -> ExtensionOutcome {
            match msg.cmd {
                wire::Cmd::Other { ref cmd, .. } if cmd == "WALLOPS" => {
                    roster.join("#wallops-log");
                    ExtensionOutcome::Handled
                }
                _ => ExtensionOutcome::Unchanged,
            }
        }
    }

    struct Panicker;

    impl Extension for Panicker {
        fn handle(&mut self, _msg: &wire::Msg, _roster: &mut Roster) -> ExtensionOutcome {
            panic!("misbehaving extension")
        }
    }

    #[test]
    fn test_first_handled_wins() {
        let msg = wire::parse_line(":irc.example WALLOPS :look out").unwrap();
        let mut roster = Roster::new();
        let mut exts = Extensions::new(vec![Box::new(WallopsLogger)]);
        assert!(exts.run(&msg, &mut roster));
        assert!(roster.get("#wallops-log").is_some());

        let other = wire::parse_line(":irc.example 366 bob #room :End").unwrap();
        assert!(!exts.run(&other, &mut roster));
    }

    #[test]
    fn test_panicking_extension_is_unchanged() {
        let msg = wire::parse_line(":irc.example WALLOPS :look out").unwrap();
        let mut roster = Roster::new();
        let mut exts = Extensions::new(vec![
            Box::new(Panicker),
            Box::new(WallopsLogger),
        ]);
        // The panic is swallowed and the next extension still runs
        assert!(exts.run(&msg, &mut roster));
    }
}
