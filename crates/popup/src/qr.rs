use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reweave_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use reweave_events::Event;

use crate::order::{PopupOrderId, PopupPaymentMethod};

/// How long a generated QR code stays payable.
pub const QR_VALIDITY: Duration = Duration::minutes(5);

/// QR payment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QrPaymentId(pub AggregateId);

impl QrPaymentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for QrPaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrPaymentStatus {
    Pending,
    Paid,
}

/// Build the payable code string:
/// `PAY_<method code>_<popup number>_<amount cents>_<epoch millis>_<6 alnum>`.
pub fn generate_qr_code(
    method: PopupPaymentMethod,
    popup_number: &str,
    amount: Money,
    now: DateTime<Utc>,
) -> String {
    let uuid = Uuid::now_v7().simple().to_string();
    let suffix = uuid[uuid.len() - 6..].to_uppercase();
    format!(
        "PAY_{}_{}_{}_{}_{}",
        method.short_code(),
        popup_number,
        amount.cents(),
        now.timestamp_millis(),
        suffix
    )
}

/// Aggregate root: QrPayment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayment {
    id: QrPaymentId,
    code: String,
    popup_order_id: PopupOrderId,
    amount: Money,
    method: PopupPaymentMethod,
    expires_at: DateTime<Utc>,
    status: QrPaymentStatus,
    version: u64,
    created: bool,
}

impl QrPayment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: QrPaymentId) -> Self {
        Self {
            id,
            code: String::new(),
            popup_order_id: PopupOrderId::new(AggregateId::nil()),
            amount: Money::ZERO,
            method: PopupPaymentMethod::Qr,
            expires_at: DateTime::<Utc>::MIN_UTC,
            status: QrPaymentStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> QrPaymentId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn popup_order_id(&self) -> PopupOrderId {
        self.popup_order_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn status(&self) -> QrPaymentStatus {
        self.status
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl AggregateRoot for QrPayment {
    type Id = QrPaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: GenerateQrPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateQrPayment {
    pub payment_id: QrPaymentId,
    pub popup_order_id: PopupOrderId,
    pub popup_number: String,
    pub amount: Money,
    pub method: PopupPaymentMethod,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VerifyQrPayment. Scanning the code at the till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyQrPayment {
    pub payment_id: QrPaymentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QrPaymentCommand {
    GenerateQrPayment(GenerateQrPayment),
    VerifyQrPayment(VerifyQrPayment),
}

/// Event: QrPaymentGenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPaymentGenerated {
    pub payment_id: QrPaymentId,
    pub popup_order_id: PopupOrderId,
    pub code: String,
    pub amount: Money,
    pub method: PopupPaymentMethod,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QrPaymentVerified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPaymentVerified {
    pub payment_id: QrPaymentId,
    pub popup_order_id: PopupOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QrPaymentEvent {
    QrPaymentGenerated(QrPaymentGenerated),
    QrPaymentVerified(QrPaymentVerified),
}

impl Event for QrPaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QrPaymentEvent::QrPaymentGenerated(_) => "popup.qr_payment.generated",
            QrPaymentEvent::QrPaymentVerified(_) => "popup.qr_payment.verified",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QrPaymentEvent::QrPaymentGenerated(e) => e.occurred_at,
            QrPaymentEvent::QrPaymentVerified(e) => e.occurred_at,
        }
    }
}

impl Aggregate for QrPayment {
    type Command = QrPaymentCommand;
    type Event = QrPaymentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QrPaymentEvent::QrPaymentGenerated(e) => {
                self.id = e.payment_id;
                self.code = e.code.clone();
                self.popup_order_id = e.popup_order_id;
                self.amount = e.amount;
                self.method = e.method;
                self.expires_at = e.expires_at;
                self.status = QrPaymentStatus::Pending;
                self.created = true;
            }
            QrPaymentEvent::QrPaymentVerified(_) => {
                self.status = QrPaymentStatus::Paid;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QrPaymentCommand::GenerateQrPayment(cmd) => self.handle_generate(cmd),
            QrPaymentCommand::VerifyQrPayment(cmd) => self.handle_verify(cmd),
        }
    }
}

impl QrPayment {
    fn handle_generate(&self, cmd: &GenerateQrPayment) -> Result<Vec<QrPaymentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment already generated"));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("amount must be positive"));
        }

        let code = generate_qr_code(cmd.method, &cmd.popup_number, cmd.amount, cmd.occurred_at);

        Ok(vec![QrPaymentEvent::QrPaymentGenerated(QrPaymentGenerated {
            payment_id: cmd.payment_id,
            popup_order_id: cmd.popup_order_id,
            code,
            amount: cmd.amount,
            method: cmd.method,
            expires_at: cmd.occurred_at + QR_VALIDITY,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify(&self, cmd: &VerifyQrPayment) -> Result<Vec<QrPaymentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status == QrPaymentStatus::Paid {
            return Err(DomainError::AlreadyPaid);
        }
        if self.is_expired(cmd.occurred_at) {
            return Err(DomainError::validation("payment code has expired"));
        }

        Ok(vec![QrPaymentEvent::QrPaymentVerified(QrPaymentVerified {
            payment_id: cmd.payment_id,
            popup_order_id: self.popup_order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_payment_id() -> QrPaymentId {
        QrPaymentId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn generated_payment(at: DateTime<Utc>) -> QrPayment {
        let id = test_payment_id();
        let mut payment = QrPayment::empty(id);
        let events = payment
            .handle(&QrPaymentCommand::GenerateQrPayment(GenerateQrPayment {
                payment_id: id,
                popup_order_id: PopupOrderId::new(AggregateId::new()),
                popup_number: "POP-1700000000000-AB12CD".to_string(),
                amount: Money::from_cents(9_000),
                method: PopupPaymentMethod::Qr,
                occurred_at: at,
            }))
            .unwrap();
        payment.apply(&events[0]);
        payment
    }

    #[test]
    fn generated_code_carries_method_order_and_amount() {
        let payment = generated_payment(test_time());
        let code = payment.code();
        assert!(code.starts_with("PAY_QRX_POP-1700000000000-AB12CD_9000_"));
        assert_eq!(code.split('_').count(), 6);
    }

    #[test]
    fn verify_within_window_marks_paid() {
        let now = test_time();
        let mut payment = generated_payment(now);
        let events = payment
            .handle(&QrPaymentCommand::VerifyQrPayment(VerifyQrPayment {
                payment_id: payment.id_typed(),
                occurred_at: now + Duration::minutes(4),
            }))
            .unwrap();
        payment.apply(&events[0]);
        assert_eq!(payment.status(), QrPaymentStatus::Paid);
    }

    #[test]
    fn verify_after_five_minutes_fails() {
        let now = test_time();
        let payment = generated_payment(now);
        let err = payment
            .handle(&QrPaymentCommand::VerifyQrPayment(VerifyQrPayment {
                payment_id: payment.id_typed(),
                occurred_at: now + Duration::minutes(6),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn verify_twice_is_rejected() {
        let now = test_time();
        let mut payment = generated_payment(now);
        let events = payment
            .handle(&QrPaymentCommand::VerifyQrPayment(VerifyQrPayment {
                payment_id: payment.id_typed(),
                occurred_at: now,
            }))
            .unwrap();
        payment.apply(&events[0]);

        let err = payment
            .handle(&QrPaymentCommand::VerifyQrPayment(VerifyQrPayment {
                payment_id: payment.id_typed(),
                occurred_at: now,
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyPaid);
    }
}
