use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reweave_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use reweave_events::Event;

use crate::product::ProductId;

/// Preorder batch identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreorderBatchId(pub AggregateId);

impl PreorderBatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PreorderBatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Preorder batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Draft,
    Active,
    Closed,
    Cancelled,
    Delivered,
}

/// Aggregate root: PreorderBatch.
///
/// A production run for a preorder product. Slots move reserved -> sold as
/// checkouts complete; `total_slots` caps reserved + sold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreorderBatch {
    id: PreorderBatchId,
    product_id: ProductId,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    total_slots: i64,
    reserved_slots: i64,
    sold_slots: i64,
    expected_delivery: DateTime<Utc>,
    status: BatchStatus,
    version: u64,
    created: bool,
}

impl PreorderBatch {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PreorderBatchId) -> Self {
        Self {
            id,
            product_id: ProductId::new(AggregateId::nil()),
            starts_at: DateTime::<Utc>::MIN_UTC,
            ends_at: DateTime::<Utc>::MIN_UTC,
            total_slots: 0,
            reserved_slots: 0,
            sold_slots: 0,
            expected_delivery: DateTime::<Utc>::MIN_UTC,
            status: BatchStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PreorderBatchId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn total_slots(&self) -> i64 {
        self.total_slots
    }

    pub fn reserved_slots(&self) -> i64 {
        self.reserved_slots
    }

    pub fn sold_slots(&self) -> i64 {
        self.sold_slots
    }

    pub fn expected_delivery(&self) -> DateTime<Utc> {
        self.expected_delivery
    }

    /// Slots still open for new preorders.
    pub fn available_slots(&self) -> i64 {
        self.total_slots - self.reserved_slots - self.sold_slots
    }

    /// A batch takes preorders while active and inside its window.
    pub fn is_taking_orders(&self, now: DateTime<Utc>) -> bool {
        self.status == BatchStatus::Active && now >= self.starts_at && now <= self.ends_at
    }
}

impl AggregateRoot for PreorderBatch {
    type Id = PreorderBatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenBatch. Creates the batch already taking orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBatch {
    pub batch_id: PreorderBatchId,
    pub product_id: ProductId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub total_slots: i64,
    pub expected_delivery: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveSlots. Holds slots while a checkout is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSlots {
    pub batch_id: PreorderBatchId,
    pub quantity: i64,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseSlots. Returns held slots after a failed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSlots {
    pub batch_id: PreorderBatchId,
    pub quantity: i64,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkSlotsSold. Converts held slots into sales on payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSlotsSold {
    pub batch_id: PreorderBatchId,
    pub quantity: i64,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseBatch. Stops taking orders; sold slots stand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseBatch {
    pub batch_id: PreorderBatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBatch {
    pub batch_id: PreorderBatchId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkDelivered. Terminal state once the run ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDelivered {
    pub batch_id: PreorderBatchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreorderCommand {
    OpenBatch(OpenBatch),
    ReserveSlots(ReserveSlots),
    ReleaseSlots(ReleaseSlots),
    MarkSlotsSold(MarkSlotsSold),
    CloseBatch(CloseBatch),
    CancelBatch(CancelBatch),
    MarkDelivered(MarkDelivered),
}

/// Event: BatchOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOpened {
    pub batch_id: PreorderBatchId,
    pub product_id: ProductId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub total_slots: i64,
    pub expected_delivery: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotsReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotsReserved {
    pub batch_id: PreorderBatchId,
    pub quantity: i64,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotsReleased. `quantity` is clamped to the held amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotsReleased {
    pub batch_id: PreorderBatchId,
    pub quantity: i64,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotsSold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotsSold {
    pub batch_id: PreorderBatchId,
    pub quantity: i64,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchClosed {
    pub batch_id: PreorderBatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCancelled {
    pub batch_id: PreorderBatchId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDelivered {
    pub batch_id: PreorderBatchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreorderEvent {
    BatchOpened(BatchOpened),
    SlotsReserved(SlotsReserved),
    SlotsReleased(SlotsReleased),
    SlotsSold(SlotsSold),
    BatchClosed(BatchClosed),
    BatchCancelled(BatchCancelled),
    BatchDelivered(BatchDelivered),
}

impl Event for PreorderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PreorderEvent::BatchOpened(_) => "products.preorder.opened",
            PreorderEvent::SlotsReserved(_) => "products.preorder.slots_reserved",
            PreorderEvent::SlotsReleased(_) => "products.preorder.slots_released",
            PreorderEvent::SlotsSold(_) => "products.preorder.slots_sold",
            PreorderEvent::BatchClosed(_) => "products.preorder.closed",
            PreorderEvent::BatchCancelled(_) => "products.preorder.cancelled",
            PreorderEvent::BatchDelivered(_) => "products.preorder.delivered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PreorderEvent::BatchOpened(e) => e.occurred_at,
            PreorderEvent::SlotsReserved(e) => e.occurred_at,
            PreorderEvent::SlotsReleased(e) => e.occurred_at,
            PreorderEvent::SlotsSold(e) => e.occurred_at,
            PreorderEvent::BatchClosed(e) => e.occurred_at,
            PreorderEvent::BatchCancelled(e) => e.occurred_at,
            PreorderEvent::BatchDelivered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PreorderBatch {
    type Command = PreorderCommand;
    type Event = PreorderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PreorderEvent::BatchOpened(e) => {
                self.id = e.batch_id;
                self.product_id = e.product_id;
                self.starts_at = e.starts_at;
                self.ends_at = e.ends_at;
                self.total_slots = e.total_slots;
                self.reserved_slots = 0;
                self.sold_slots = 0;
                self.expected_delivery = e.expected_delivery;
                self.status = BatchStatus::Active;
                self.created = true;
            }
            PreorderEvent::SlotsReserved(e) => {
                self.reserved_slots += e.quantity;
            }
            PreorderEvent::SlotsReleased(e) => {
                self.reserved_slots -= e.quantity;
            }
            PreorderEvent::SlotsSold(e) => {
                self.reserved_slots -= e.quantity;
                self.sold_slots += e.quantity;
            }
            PreorderEvent::BatchClosed(_) => {
                self.status = BatchStatus::Closed;
            }
            PreorderEvent::BatchCancelled(_) => {
                self.status = BatchStatus::Cancelled;
            }
            PreorderEvent::BatchDelivered(_) => {
                self.status = BatchStatus::Delivered;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PreorderCommand::OpenBatch(cmd) => self.handle_open(cmd),
            PreorderCommand::ReserveSlots(cmd) => self.handle_reserve(cmd),
            PreorderCommand::ReleaseSlots(cmd) => self.handle_release(cmd),
            PreorderCommand::MarkSlotsSold(cmd) => self.handle_mark_sold(cmd),
            PreorderCommand::CloseBatch(cmd) => self.handle_close(cmd),
            PreorderCommand::CancelBatch(cmd) => self.handle_cancel(cmd),
            PreorderCommand::MarkDelivered(cmd) => self.handle_delivered(cmd),
        }
    }
}

impl PreorderBatch {
    fn ensure_exists(&self, batch_id: PreorderBatchId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != batch_id {
            return Err(DomainError::invariant("batch_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenBatch) -> Result<Vec<PreorderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("batch already exists"));
        }
        if cmd.total_slots <= 0 {
            return Err(DomainError::validation("total_slots must be positive"));
        }
        if cmd.ends_at <= cmd.starts_at {
            return Err(DomainError::validation("window must end after it starts"));
        }

        Ok(vec![PreorderEvent::BatchOpened(BatchOpened {
            batch_id: cmd.batch_id,
            product_id: cmd.product_id,
            starts_at: cmd.starts_at,
            ends_at: cmd.ends_at,
            total_slots: cmd.total_slots,
            expected_delivery: cmd.expected_delivery,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveSlots) -> Result<Vec<PreorderEvent>, DomainError> {
        self.ensure_exists(cmd.batch_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if !self.is_taking_orders(cmd.occurred_at) {
            return Err(DomainError::invalid_state("batch is not taking orders"));
        }
        if cmd.quantity > self.available_slots() {
            return Err(DomainError::insufficient_inventory(format!(
                "requested {} slots but only {} remain",
                cmd.quantity,
                self.available_slots()
            )));
        }

        Ok(vec![PreorderEvent::SlotsReserved(SlotsReserved {
            batch_id: cmd.batch_id,
            quantity: cmd.quantity,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseSlots) -> Result<Vec<PreorderEvent>, DomainError> {
        self.ensure_exists(cmd.batch_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        // Clamp so a late or repeated release never drives reserved negative.
        let released = cmd.quantity.min(self.reserved_slots);

        Ok(vec![PreorderEvent::SlotsReleased(SlotsReleased {
            batch_id: cmd.batch_id,
            quantity: released,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_sold(&self, cmd: &MarkSlotsSold) -> Result<Vec<PreorderEvent>, DomainError> {
        self.ensure_exists(cmd.batch_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.quantity > self.reserved_slots {
            return Err(DomainError::invariant(
                "cannot sell more slots than are reserved",
            ));
        }

        Ok(vec![PreorderEvent::SlotsSold(SlotsSold {
            batch_id: cmd.batch_id,
            quantity: cmd.quantity,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseBatch) -> Result<Vec<PreorderEvent>, DomainError> {
        self.ensure_exists(cmd.batch_id)?;

        if self.status != BatchStatus::Active {
            return Err(DomainError::invalid_state("only active batches can be closed"));
        }

        Ok(vec![PreorderEvent::BatchClosed(BatchClosed {
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelBatch) -> Result<Vec<PreorderEvent>, DomainError> {
        self.ensure_exists(cmd.batch_id)?;

        match self.status {
            BatchStatus::Cancelled => Err(DomainError::conflict("batch is already cancelled")),
            BatchStatus::Delivered => {
                Err(DomainError::invalid_state("delivered batches cannot be cancelled"))
            }
            _ => Ok(vec![PreorderEvent::BatchCancelled(BatchCancelled {
                batch_id: cmd.batch_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_delivered(&self, cmd: &MarkDelivered) -> Result<Vec<PreorderEvent>, DomainError> {
        self.ensure_exists(cmd.batch_id)?;

        if self.status != BatchStatus::Closed {
            return Err(DomainError::invalid_state(
                "only closed batches can be marked delivered",
            ));
        }

        Ok(vec![PreorderEvent::BatchDelivered(BatchDelivered {
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_batch_id() -> PreorderBatchId {
        PreorderBatchId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn open_batch(total_slots: i64) -> PreorderBatch {
        let id = test_batch_id();
        let now = test_time();
        let mut batch = PreorderBatch::empty(id);
        let events = batch
            .handle(&PreorderCommand::OpenBatch(OpenBatch {
                batch_id: id,
                product_id: ProductId::new(AggregateId::new()),
                starts_at: now - Duration::hours(1),
                ends_at: now + Duration::days(14),
                total_slots,
                expected_delivery: now + Duration::days(45),
                occurred_at: now,
            }))
            .unwrap();
        batch.apply(&events[0]);
        batch
    }

    fn reserve(batch: &mut PreorderBatch, quantity: i64) -> Result<(), DomainError> {
        let events = batch.handle(&PreorderCommand::ReserveSlots(ReserveSlots {
            batch_id: batch.id_typed(),
            quantity,
            order_id: AggregateId::new(),
            occurred_at: test_time(),
        }))?;
        for event in &events {
            batch.apply(event);
        }
        Ok(())
    }

    #[test]
    fn open_batch_starts_active() {
        let batch = open_batch(50);
        assert_eq!(batch.status(), BatchStatus::Active);
        assert_eq!(batch.available_slots(), 50);
        assert!(batch.is_taking_orders(test_time()));
    }

    #[test]
    fn reserve_rejects_when_batch_full() {
        let mut batch = open_batch(3);
        reserve(&mut batch, 3).unwrap();

        let err = reserve(&mut batch, 1).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(_)));
    }

    #[test]
    fn reserve_outside_window_is_rejected() {
        let id = test_batch_id();
        let now = test_time();
        let mut batch = PreorderBatch::empty(id);
        let events = batch
            .handle(&PreorderCommand::OpenBatch(OpenBatch {
                batch_id: id,
                product_id: ProductId::new(AggregateId::new()),
                starts_at: now + Duration::days(1),
                ends_at: now + Duration::days(14),
                total_slots: 10,
                expected_delivery: now + Duration::days(45),
                occurred_at: now,
            }))
            .unwrap();
        batch.apply(&events[0]);

        let err = batch
            .handle(&PreorderCommand::ReserveSlots(ReserveSlots {
                batch_id: id,
                quantity: 1,
                order_id: AggregateId::new(),
                occurred_at: now,
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn sold_slots_come_out_of_reserved() {
        let mut batch = open_batch(10);
        reserve(&mut batch, 4).unwrap();

        let events = batch
            .handle(&PreorderCommand::MarkSlotsSold(MarkSlotsSold {
                batch_id: batch.id_typed(),
                quantity: 4,
                order_id: AggregateId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            batch.apply(event);
        }

        assert_eq!(batch.reserved_slots(), 0);
        assert_eq!(batch.sold_slots(), 4);
        assert_eq!(batch.available_slots(), 6);
    }

    #[test]
    fn release_clamps_to_reserved() {
        let mut batch = open_batch(10);
        reserve(&mut batch, 2).unwrap();

        let events = batch
            .handle(&PreorderCommand::ReleaseSlots(ReleaseSlots {
                batch_id: batch.id_typed(),
                quantity: 5,
                order_id: AggregateId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            batch.apply(event);
        }

        assert_eq!(batch.reserved_slots(), 0);
        assert_eq!(batch.available_slots(), 10);
    }

    #[test]
    fn cannot_sell_more_than_reserved() {
        let mut batch = open_batch(10);
        reserve(&mut batch, 2).unwrap();

        let err = batch
            .handle(&PreorderCommand::MarkSlotsSold(MarkSlotsSold {
                batch_id: batch.id_typed(),
                quantity: 3,
                order_id: AggregateId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn closed_batch_stops_taking_orders() {
        let mut batch = open_batch(10);
        let events = batch
            .handle(&PreorderCommand::CloseBatch(CloseBatch {
                batch_id: batch.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        assert_eq!(batch.status(), BatchStatus::Closed);
        assert!(!batch.is_taking_orders(test_time()));

        let err = reserve(&mut batch, 1).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn delivered_batch_cannot_be_cancelled() {
        let mut batch = open_batch(10);
        let events = batch
            .handle(&PreorderCommand::CloseBatch(CloseBatch {
                batch_id: batch.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        let events = batch
            .handle(&PreorderCommand::MarkDelivered(MarkDelivered {
                batch_id: batch.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        let err = batch
            .handle(&PreorderCommand::CancelBatch(CancelBatch {
                batch_id: batch.id_typed(),
                reason: "supplier fell through".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }
}
