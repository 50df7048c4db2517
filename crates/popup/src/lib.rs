//! Point-of-sale for in-person popup events.
//!
//! A [`PopupOrder`] is a walk-up cash/card/QR sale recorded at the stall,
//! with its own `POP-` numbering scheme and a customer book deduplicated
//! by phone number. [`QrPayment`] covers the short-lived scan-to-pay flow.

pub mod order;
pub mod qr;

pub use order::{
    generate_popup_number, CreatePopupOrder, MarkPopupOrderPaid, PopupCustomer, PopupItem,
    PopupOrder, PopupOrderCommand, PopupOrderCreated, PopupOrderEvent, PopupOrderId,
    PopupOrderPaid, PopupOrderStatus, PopupPaymentMethod,
};
pub use qr::{
    generate_qr_code, GenerateQrPayment, QrPayment, QrPaymentCommand, QrPaymentEvent,
    QrPaymentGenerated, QrPaymentId, QrPaymentStatus, QrPaymentVerified, VerifyQrPayment,
    QR_VALIDITY,
};
