//! The aggregate contract every event-sourced module implements.

use crate::error::{DomainError, DomainResult};

/// Identity and revision of a domain object.
///
/// Deliberately tiny. Each module owns its state representation; core only
/// needs to know how to address a stream and compare revisions.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Stream revision, incremented once per applied event.
    fn version(&self) -> u64;
}

/// The writer's claim about the stream revision it loaded.
///
/// Two writers that both loaded revision N race on the append; the store
/// accepts one and rejects the other with a conflict. Reserve/commit,
/// discount redemption caps and loyalty balances all rely on this check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append without checking. For idempotent commands and replays.
    Any,
    /// Append only if the stream is still at this revision.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Pure decide/evolve pair.
///
/// `handle` inspects current state and returns the events a command produces,
/// without mutating anything. `apply` folds one event into state. Neither may
/// touch a clock, IO, or randomness; the dispatcher supplies everything else.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
