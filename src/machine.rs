//! The extraction pipeline as an explicit state machine.
//!
//! Control flow is a closed tagged union: [`State`] enumerates where a
//! document is, [`Event`] enumerates what just happened, and
//! [`transition`] is a pure function from the pair to the next state. The
//! driver loop in [`crate::run`] performs the effects for the current state,
//! produces the matching event, and feeds it back in. No stage ever routes
//! by string.
//!
//! ```text
//! Screening ──skip──▶ Finishing(Skipped)
//!     │
//! Selecting ──▶ Extracting(TableFocused) ─▶ Routing ──Proceed──▶ Validating
//!                      ▲                       │                     │
//!                      │  Broaden (attempt 2)  │                     ▼
//!                 Extracting(FullDocument) ◀───┘           Finishing(Processed)
//!                      │
//!                 Routing ──Fail──▶ Finishing(Failed)
//! ```
//!
//! The decision router ([`decide`]) is evaluated once per full pass over the
//! active chunk sequence, never per chunk.

use std::fmt;

/// Escalating input scope for the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Attempt 1: chunks built from extracted table regions (or the full
    /// text when no tables matched), filtered by relevance score.
    TableFocused,
    /// Attempt 2: chunks re-built from the full cleaned document text,
    /// bypassing the table filter.
    FullDocument,
}

impl Attempt {
    pub fn number(self) -> u8 {
        match self {
            Attempt::TableFocused => 1,
            Attempt::FullDocument => 2,
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Terminal classification, matching the three outcome directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Processed,
    Skipped,
    Failed,
}

/// Where the document currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Anchor resolution and screening classification.
    Screening,
    /// Building and filtering the attempt-1 chunk sequence.
    Selecting,
    /// Iterating the active chunk sequence through the model.
    Extracting(Attempt),
    /// One full pass finished; the router decides what happens next.
    Routing(Attempt),
    /// Deduplicating/merging the accumulated items.
    Validating,
    /// A terminal handler takes over.
    Finishing(Terminal),
}

/// Router verdict after a full pass over the active chunk sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Items accumulated; proceed to validation.
    Proceed,
    /// Zero items on attempt 1; re-chunk from the full document and retry.
    Broaden,
    /// Zero items with no retry tier left (or nothing left to chunk).
    Fail,
}

/// What just happened in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Anchor resolved; `skip` is set when a classification flag screened
    /// the document out.
    Screened { skip: bool },
    /// Attempt-1 chunk sequence built.
    Selected,
    /// Cursor advanced (or there was nothing to do); `more` is whether
    /// chunks remain in the active sequence.
    ChunkDone { more: bool },
    /// Router verdict for the completed pass.
    Routed(Decision),
    /// Canonical records built.
    Validated,
}

/// The routing rule, separated out so it is testable without a driver:
/// items win, then the retry tier, then failure.
pub fn decide(attempt: Attempt, has_items: bool, max_attempts: u8) -> Decision {
    if has_items {
        Decision::Proceed
    } else if attempt == Attempt::TableFocused && max_attempts >= 2 {
        Decision::Broaden
    } else {
        Decision::Fail
    }
}

/// Pure transition function.
///
/// Invalid pairs cannot be produced by the driver; they fall through to the
/// failure terminal so a logic error surfaces as a failed document instead
/// of a hung loop.
pub fn transition(state: State, event: Event) -> State {
    match (state, event) {
        (State::Screening, Event::Screened { skip: true }) => State::Finishing(Terminal::Skipped),
        (State::Screening, Event::Screened { skip: false }) => State::Selecting,

        (State::Selecting, Event::Selected) => State::Extracting(Attempt::TableFocused),

        (State::Extracting(a), Event::ChunkDone { more: true }) => State::Extracting(a),
        (State::Extracting(a), Event::ChunkDone { more: false }) => State::Routing(a),

        (State::Routing(_), Event::Routed(Decision::Proceed)) => State::Validating,
        (State::Routing(Attempt::TableFocused), Event::Routed(Decision::Broaden)) => {
            State::Extracting(Attempt::FullDocument)
        }
        (State::Routing(_), Event::Routed(Decision::Fail)) => State::Finishing(Terminal::Failed),

        (State::Validating, Event::Validated) => State::Finishing(Terminal::Processed),

        (state, event) => {
            debug_assert!(false, "invalid transition: {state:?} on {event:?}");
            State::Finishing(Terminal::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_short_circuits_to_skipped_terminal() {
        let s = transition(State::Screening, Event::Screened { skip: true });
        assert_eq!(s, State::Finishing(Terminal::Skipped));
    }

    #[test]
    fn happy_path_reaches_processed() {
        let mut s = State::Screening;
        for e in [
            Event::Screened { skip: false },
            Event::Selected,
            Event::ChunkDone { more: true },
            Event::ChunkDone { more: false },
            Event::Routed(Decision::Proceed),
            Event::Validated,
        ] {
            s = transition(s, e);
        }
        assert_eq!(s, State::Finishing(Terminal::Processed));
    }

    #[test]
    fn empty_attempt_one_broadens_exactly_once() {
        // Attempt 1 yields nothing: the router must re-enter extraction at
        // the full-document tier exactly once, then route to failure.
        assert_eq!(
            decide(Attempt::TableFocused, false, 2),
            Decision::Broaden
        );
        let s = transition(
            State::Routing(Attempt::TableFocused),
            Event::Routed(Decision::Broaden),
        );
        assert_eq!(s, State::Extracting(Attempt::FullDocument));

        // A zero-item attempt 2 must reach Failed, not loop a third time.
        assert_eq!(decide(Attempt::FullDocument, false, 2), Decision::Fail);
        let s = transition(
            State::Routing(Attempt::FullDocument),
            Event::Routed(Decision::Fail),
        );
        assert_eq!(s, State::Finishing(Terminal::Failed));
    }

    #[test]
    fn items_always_proceed_to_validation() {
        for attempt in [Attempt::TableFocused, Attempt::FullDocument] {
            assert_eq!(decide(attempt, true, 2), Decision::Proceed);
        }
    }

    #[test]
    fn single_tier_config_fails_without_broadening() {
        assert_eq!(decide(Attempt::TableFocused, false, 1), Decision::Fail);
    }

    #[test]
    fn extraction_loops_while_chunks_remain() {
        let s = State::Extracting(Attempt::TableFocused);
        assert_eq!(transition(s, Event::ChunkDone { more: true }), s);
        assert_eq!(
            transition(s, Event::ChunkDone { more: false }),
            State::Routing(Attempt::TableFocused)
        );
    }
}
