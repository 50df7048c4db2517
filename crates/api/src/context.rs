//! Per-request context extracted by the auth middleware.

use reweave_core::CustomerId;

/// The authenticated customer behind a request.
#[derive(Debug, Clone, Copy)]
pub struct CustomerContext {
    customer_id: CustomerId,
}

impl CustomerContext {
    pub fn new(customer_id: CustomerId) -> Self {
        Self { customer_id }
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }
}
