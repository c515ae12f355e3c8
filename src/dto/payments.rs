use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Payment, PaymentMethod, Refund};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    /// Must be one of the asynchronous card methods.
    pub method: PaymentMethod,
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CashPaymentRequest {
    pub order_id: Uuid,
    pub amount_received_minor: i64,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TerminalPaymentRequest {
    pub order_id: Uuid,
    pub terminal_tx_id: String,
    pub terminal_id: String,
    pub card_last4: Option<String>,
    pub card_brand: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Omitted means the full remaining refundable amount.
    pub amount_minor: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentWithRefunds {
    pub payment: Payment,
    pub refunds: Vec<Refund>,
}
