use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reweave_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use reweave_events::Event;

/// Stock record identifier. One record per product, or per variant of a
/// product when `variant_id` is set on the record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockRecordId(pub AggregateId);

impl StockRecordId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What a stock movement traces back to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementSource {
    Order(AggregateId),
    PopupOrder(AggregateId),
    Manual,
}

/// Aggregate root: StockRecord.
///
/// Counters:
/// - `quantity_available` is total on-hand stock,
/// - `quantity_reserved` is held for carts and preorders,
/// - `quantity_committed` is sold against confirmed orders.
///
/// Free-to-promise stock is `available - reserved - committed`; every
/// availability check goes through [`StockRecord::free`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRecord {
    id: StockRecordId,
    product_id: AggregateId,
    variant_id: Option<AggregateId>,
    quantity_available: i64,
    quantity_reserved: i64,
    quantity_committed: i64,
    low_stock_threshold: i64,
    reorder_point: i64,
    version: u64,
    created: bool,
}

impl StockRecord {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockRecordId) -> Self {
        Self {
            id,
            product_id: AggregateId::nil(),
            variant_id: None,
            quantity_available: 0,
            quantity_reserved: 0,
            quantity_committed: 0,
            low_stock_threshold: 0,
            reorder_point: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockRecordId {
        self.id
    }

    pub fn product_id(&self) -> AggregateId {
        self.product_id
    }

    pub fn variant_id(&self) -> Option<AggregateId> {
        self.variant_id
    }

    pub fn quantity_available(&self) -> i64 {
        self.quantity_available
    }

    pub fn quantity_reserved(&self) -> i64 {
        self.quantity_reserved
    }

    pub fn quantity_committed(&self) -> i64 {
        self.quantity_committed
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    pub fn reorder_point(&self) -> i64 {
        self.reorder_point
    }

    /// Free-to-promise quantity.
    pub fn free(&self) -> i64 {
        self.quantity_available - self.quantity_reserved - self.quantity_committed
    }

    pub fn is_low_stock(&self) -> bool {
        self.free() <= self.low_stock_threshold
    }
}

impl AggregateRoot for StockRecord {
    type Id = StockRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateStockRecord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStockRecord {
    pub record_id: StockRecordId,
    pub product_id: AggregateId,
    pub variant_id: Option<AggregateId>,
    pub initial_quantity: i64,
    pub low_stock_threshold: i64,
    pub reorder_point: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock. Manual correction of on-hand stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub record_id: StockRecordId,
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock. Holds free stock without decrementing on-hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub source: MovementSource,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock. Returns held stock to the free pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub source: MovementSource,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CommitStock. Converts stock into a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub source: MovementSource,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Restock. Returns committed stock to the shelf when an order is
/// cancelled or a checkout step is unwound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub source: MovementSource,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    CreateStockRecord(CreateStockRecord),
    AdjustStock(AdjustStock),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
    CommitStock(CommitStock),
    Restock(Restock),
}

/// Event: StockRecordCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecordCreated {
    pub record_id: StockRecordId,
    pub product_id: AggregateId,
    pub variant_id: Option<AggregateId>,
    pub initial_quantity: i64,
    pub low_stock_threshold: i64,
    pub reorder_point: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted. `previous_free`/`new_free` snapshot the
/// free-to-promise quantity for the movement trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub record_id: StockRecordId,
    pub delta: i64,
    pub previous_free: i64,
    pub new_free: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub previous_free: i64,
    pub new_free: i64,
    pub source: MovementSource,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased. `quantity` is the amount actually released,
/// which may be less than requested when the hold was already partially
/// released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub requested: i64,
    pub previous_free: i64,
    pub new_free: i64,
    pub source: MovementSource,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockCommitted. `reserved_released` is how much of the commit
/// came out of the reserved pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCommitted {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub reserved_released: i64,
    pub previous_free: i64,
    pub new_free: i64,
    pub source: MovementSource,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockRestocked. `committed_released` is how much of the restock
/// reversed a prior commit rather than adding net-new stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRestocked {
    pub record_id: StockRecordId,
    pub quantity: i64,
    pub committed_released: i64,
    pub previous_free: i64,
    pub new_free: i64,
    pub source: MovementSource,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    StockRecordCreated(StockRecordCreated),
    StockAdjusted(StockAdjusted),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
    StockCommitted(StockCommitted),
    StockRestocked(StockRestocked),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockRecordCreated(_) => "inventory.record.created",
            StockEvent::StockAdjusted(_) => "inventory.record.adjusted",
            StockEvent::StockReserved(_) => "inventory.record.reserved",
            StockEvent::StockReleased(_) => "inventory.record.released",
            StockEvent::StockCommitted(_) => "inventory.record.committed",
            StockEvent::StockRestocked(_) => "inventory.record.restocked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockRecordCreated(e) => e.occurred_at,
            StockEvent::StockAdjusted(e) => e.occurred_at,
            StockEvent::StockReserved(e) => e.occurred_at,
            StockEvent::StockReleased(e) => e.occurred_at,
            StockEvent::StockCommitted(e) => e.occurred_at,
            StockEvent::StockRestocked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockRecord {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::StockRecordCreated(e) => {
                self.id = e.record_id;
                self.product_id = e.product_id;
                self.variant_id = e.variant_id;
                self.quantity_available = e.initial_quantity;
                self.quantity_reserved = 0;
                self.quantity_committed = 0;
                self.low_stock_threshold = e.low_stock_threshold;
                self.reorder_point = e.reorder_point;
                self.created = true;
            }
            StockEvent::StockAdjusted(e) => {
                self.quantity_available += e.delta;
            }
            StockEvent::StockReserved(e) => {
                self.quantity_reserved += e.quantity;
            }
            StockEvent::StockReleased(e) => {
                self.quantity_reserved -= e.quantity;
            }
            StockEvent::StockCommitted(e) => {
                self.quantity_available -= e.quantity;
                self.quantity_reserved -= e.reserved_released;
                self.quantity_committed += e.quantity;
            }
            StockEvent::StockRestocked(e) => {
                self.quantity_available += e.quantity;
                self.quantity_committed -= e.committed_released;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::CreateStockRecord(cmd) => self.handle_create(cmd),
            StockCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            StockCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            StockCommand::ReleaseStock(cmd) => self.handle_release(cmd),
            StockCommand::CommitStock(cmd) => self.handle_commit(cmd),
            StockCommand::Restock(cmd) => self.handle_restock(cmd),
        }
    }
}

impl StockRecord {
    fn ensure_record_id(&self, record_id: StockRecordId) -> Result<(), DomainError> {
        if self.id != record_id {
            return Err(DomainError::invariant("record_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, record_id: StockRecordId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_record_id(record_id)
    }

    fn handle_create(&self, cmd: &CreateStockRecord) -> Result<Vec<StockEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock record already exists"));
        }
        if cmd.initial_quantity < 0 {
            return Err(DomainError::validation("initial_quantity cannot be negative"));
        }
        if cmd.low_stock_threshold < 0 || cmd.reorder_point < 0 {
            return Err(DomainError::validation("thresholds cannot be negative"));
        }
        Ok(vec![StockEvent::StockRecordCreated(StockRecordCreated {
            record_id: cmd.record_id,
            product_id: cmd.product_id,
            variant_id: cmd.variant_id,
            initial_quantity: cmd.initial_quantity,
            low_stock_threshold: cmd.low_stock_threshold,
            reorder_point: cmd.reorder_point,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_exists(cmd.record_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let new_available = self.quantity_available + cmd.delta;
        if new_available < self.quantity_reserved + self.quantity_committed {
            return Err(DomainError::invariant(
                "adjustment would take on-hand stock below held stock",
            ));
        }

        Ok(vec![StockEvent::StockAdjusted(StockAdjusted {
            record_id: cmd.record_id,
            delta: cmd.delta,
            previous_free: self.free(),
            new_free: self.free() + cmd.delta,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_exists(cmd.record_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.quantity > self.free() {
            return Err(DomainError::insufficient_inventory(format!(
                "requested {} but only {} free",
                cmd.quantity,
                self.free()
            )));
        }

        Ok(vec![StockEvent::StockReserved(StockReserved {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            previous_free: self.free(),
            new_free: self.free() - cmd.quantity,
            source: cmd.source,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_exists(cmd.record_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        // Releasing more than is held clamps to the held amount. A second
        // release of the same hold is a no-op that still leaves a movement.
        let released = cmd.quantity.min(self.quantity_reserved);

        Ok(vec![StockEvent::StockReleased(StockReleased {
            record_id: cmd.record_id,
            quantity: released,
            requested: cmd.quantity,
            previous_free: self.free(),
            new_free: self.free() + released,
            source: cmd.source,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_commit(&self, cmd: &CommitStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_exists(cmd.record_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        // A sale draws on free stock only. Outstanding reservations never
        // widen the budget, so a fully reserved record rejects every commit.
        if cmd.quantity > self.free() {
            return Err(DomainError::insufficient_inventory(format!(
                "requested {} but only {} free",
                cmd.quantity,
                self.free()
            )));
        }

        // A committed unit leaves both the on-hand and the free pool, so
        // the free axis moves by twice the quantity, less any reservation
        // the sale absorbs.
        let reserved_released = cmd.quantity.min(self.quantity_reserved);
        Ok(vec![StockEvent::StockCommitted(StockCommitted {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            reserved_released,
            previous_free: self.free(),
            new_free: self.free() + reserved_released - 2 * cmd.quantity,
            source: cmd.source,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restock(&self, cmd: &Restock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_exists(cmd.record_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        // Restocking past the committed pool adds net-new stock; the
        // committed counter is only unwound as far as it goes.
        let committed_released = cmd.quantity.min(self.quantity_committed);

        Ok(vec![StockEvent::StockRestocked(StockRestocked {
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            committed_released,
            previous_free: self.free(),
            new_free: self.free() + cmd.quantity + committed_released,
            source: cmd.source,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_record_id() -> StockRecordId {
        StockRecordId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_record(initial: i64) -> StockRecord {
        let id = test_record_id();
        let mut record = StockRecord::empty(id);
        let events = record
            .handle(&StockCommand::CreateStockRecord(CreateStockRecord {
                record_id: id,
                product_id: AggregateId::new(),
                variant_id: None,
                initial_quantity: initial,
                low_stock_threshold: 5,
                reorder_point: 10,
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            record.apply(event);
        }
        record
    }

    fn reserve(record: &mut StockRecord, quantity: i64) -> Result<(), DomainError> {
        let events = record.handle(&StockCommand::ReserveStock(ReserveStock {
            record_id: record.id_typed(),
            quantity,
            source: MovementSource::Manual,
            occurred_at: test_time(),
        }))?;
        for event in &events {
            record.apply(event);
        }
        Ok(())
    }

    fn release(record: &mut StockRecord, quantity: i64) {
        let events = record
            .handle(&StockCommand::ReleaseStock(ReleaseStock {
                record_id: record.id_typed(),
                quantity,
                source: MovementSource::Manual,
                reason: "test".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            record.apply(event);
        }
    }

    fn commit(record: &mut StockRecord, quantity: i64) -> Result<(), DomainError> {
        let events = record.handle(&StockCommand::CommitStock(CommitStock {
            record_id: record.id_typed(),
            quantity,
            source: MovementSource::Order(AggregateId::new()),
            occurred_at: test_time(),
        }))?;
        for event in &events {
            record.apply(event);
        }
        Ok(())
    }

    fn restock(record: &mut StockRecord, quantity: i64) {
        let events = record
            .handle(&StockCommand::Restock(Restock {
                record_id: record.id_typed(),
                quantity,
                source: MovementSource::Order(AggregateId::new()),
                reason: "order cancelled".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            record.apply(event);
        }
    }

    #[test]
    fn create_emits_record_created_event() {
        let id = test_record_id();
        let record = StockRecord::empty(id);
        let events = record
            .handle(&StockCommand::CreateStockRecord(CreateStockRecord {
                record_id: id,
                product_id: AggregateId::new(),
                variant_id: None,
                initial_quantity: 25,
                low_stock_threshold: 5,
                reorder_point: 10,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            StockEvent::StockRecordCreated(e) => {
                assert_eq!(e.record_id, id);
                assert_eq!(e.initial_quantity, 25);
            }
            _ => panic!("Expected StockRecordCreated event"),
        }
    }

    #[test]
    fn reserve_rejects_more_than_free() {
        let mut record = created_record(10);
        reserve(&mut record, 7).unwrap();
        assert_eq!(record.free(), 3);

        let err = reserve(&mut record, 4).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(_)));
        assert_eq!(record.quantity_reserved(), 7);
    }

    #[test]
    fn reserve_accepts_exactly_free() {
        let mut record = created_record(10);
        reserve(&mut record, 10).unwrap();
        assert_eq!(record.free(), 0);
        assert_eq!(record.quantity_reserved(), 10);
    }

    #[test]
    fn release_clamps_to_reserved() {
        let mut record = created_record(10);
        reserve(&mut record, 3).unwrap();
        release(&mut record, 5);
        assert_eq!(record.quantity_reserved(), 0);
        assert_eq!(record.free(), 10);
    }

    #[test]
    fn double_release_is_a_no_op() {
        let mut record = created_record(10);
        reserve(&mut record, 3).unwrap();
        release(&mut record, 3);
        release(&mut record, 3);
        assert_eq!(record.quantity_reserved(), 0);
        assert_eq!(record.free(), 10);
    }

    #[test]
    fn commit_consumes_reservation() {
        let mut record = created_record(10);
        reserve(&mut record, 4).unwrap();
        commit(&mut record, 4).unwrap();
        assert_eq!(record.quantity_reserved(), 0);
        assert_eq!(record.quantity_committed(), 4);
        assert_eq!(record.quantity_available(), 6);
    }

    #[test]
    fn commit_is_rejected_when_reservations_hold_all_stock() {
        let mut record = created_record(10);
        reserve(&mut record, 10).unwrap();
        assert_eq!(record.free(), 0);

        let err = commit(&mut record, 5).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(_)));

        // The rejection leaves the ledger untouched and the held stock
        // still covered by on-hand stock.
        assert_eq!(record.quantity_available(), 10);
        assert_eq!(record.quantity_reserved(), 10);
        assert_eq!(record.quantity_committed(), 0);
        assert!(record.quantity_reserved() + record.quantity_committed() <= record.quantity_available());
    }

    #[test]
    fn commit_without_reservation_checks_free() {
        let mut record = created_record(1);
        let err = commit(&mut record, 2).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(_)));
        assert_eq!(record.quantity_committed(), 0);
    }

    #[test]
    fn restock_reverses_a_commit() {
        let mut record = created_record(10);
        commit(&mut record, 4).unwrap();
        restock(&mut record, 4);
        assert_eq!(record.quantity_available(), 10);
        assert_eq!(record.quantity_committed(), 0);
        assert_eq!(record.free(), 10);
    }

    #[test]
    fn restock_beyond_committed_adds_net_new_stock() {
        let mut record = created_record(10);
        commit(&mut record, 2).unwrap();
        restock(&mut record, 5);
        assert_eq!(record.quantity_committed(), 0);
        assert_eq!(record.quantity_available(), 13);
        assert_eq!(record.free(), 13);
    }

    #[test]
    fn adjust_cannot_take_on_hand_below_held() {
        let mut record = created_record(10);
        reserve(&mut record, 6).unwrap();

        let err = record
            .handle(&StockCommand::AdjustStock(AdjustStock {
                record_id: record.id_typed(),
                delta: -5,
                reason: "damaged".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let record = created_record(10);
        let before = record.clone();
        let _ = record.handle(&StockCommand::ReserveStock(ReserveStock {
            record_id: record.id_typed(),
            quantity: 5,
            source: MovementSource::Manual,
            occurred_at: test_time(),
        }));
        assert_eq!(record, before);
    }

    #[test]
    fn low_stock_tracks_free_quantity() {
        let mut record = created_record(10);
        assert!(!record.is_low_stock());
        reserve(&mut record, 6).unwrap();
        assert!(record.is_low_stock());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of accepted reserve/release/commit commands
        /// drives any ledger counter negative.
        #[test]
        fn counters_never_go_negative(
            ops in prop::collection::vec((0u8..3, 1i64..20), 1..40)
        ) {
            let mut record = created_record(50);

            for (op, quantity) in ops {
                match op {
                    0 => { let _ = reserve(&mut record, quantity); }
                    1 => { release(&mut record, quantity); }
                    _ => { let _ = commit(&mut record, quantity); }
                }

                prop_assert!(record.quantity_reserved() >= 0);
                prop_assert!(record.quantity_committed() >= 0);
                prop_assert!(record.quantity_available() >= 0);
            }
        }

        /// Property: a reserve is accepted exactly when the requested
        /// quantity fits in the free pool.
        #[test]
        fn reserve_succeeds_iff_quantity_fits_free(
            initial in 0i64..30,
            quantity in 1i64..40
        ) {
            let mut record = created_record(initial);
            let free = record.free();
            let result = reserve(&mut record, quantity);
            prop_assert_eq!(result.is_ok(), quantity <= free);
        }
    }
}
