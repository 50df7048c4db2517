//! Product catalog domain module (event-sourced).
//!
//! Products, their variants, and preorder production batches. Pure domain
//! logic (no IO, no HTTP, no storage).

pub mod preorder;
pub mod product;

pub use preorder::{
    BatchCancelled, BatchClosed, BatchDelivered, BatchOpened, BatchStatus, CancelBatch,
    CloseBatch, MarkDelivered, MarkSlotsSold, OpenBatch, PreorderBatch, PreorderBatchId,
    PreorderCommand, PreorderEvent, ReleaseSlots, ReserveSlots, SlotsReleased, SlotsReserved,
    SlotsSold,
};
pub use product::{
    ActivateProduct, ArchiveProduct, CreateProduct, Product, ProductActivated, ProductArchived,
    ProductCommand, ProductCreated, ProductDetails, ProductEvent, ProductId, ProductStatus,
    ProductUpdated, ProductViewed, RecordView, UpdateProduct, Variant, VariantId,
};
