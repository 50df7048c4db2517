//! Inventory domain module (event-sourced).
//!
//! Stock counters and the reserve/release/commit protocol, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).
//! The event stream of a [`StockRecord`] is its movement audit trail.

pub mod record;

pub use record::{
    AdjustStock, CommitStock, CreateStockRecord, MovementSource, ReleaseStock, ReserveStock,
    Restock, StockAdjusted, StockCommand, StockCommitted, StockEvent, StockRecord,
    StockRecordCreated, StockRecordId, StockReleased, StockReserved, StockRestocked,
};
