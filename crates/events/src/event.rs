use chrono::{DateTime, Utc};

/// Contract every domain event implements.
///
/// Events are immutable facts. Once appended they are never edited, only
/// superseded by later events; `version` exists so payload schemas can
/// evolve without rewriting history.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, e.g. `"inventory.stock.reserved"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time: when the thing happened, not when it was stored.
    fn occurred_at(&self) -> DateTime<Utc>;
}
