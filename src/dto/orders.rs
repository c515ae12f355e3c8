use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{DeliveryType, Order, OrderItem, OrderStatus};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub restaurant_id: Uuid,
    pub table_id: Option<Uuid>,
    pub delivery_type: DeliveryType,
    pub customer_name: String,
    pub customer_phone: String,
    pub special_instructions: Option<String>,
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateOrderItem {
    pub product_id: Uuid,
    pub variant_label: Option<String>,
    pub quantity: i32,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub estimated_minutes: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: String,
    #[serde(default)]
    pub refund: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkStatusRequest {
    pub order_ids: Vec<Uuid>,
    pub status: OrderStatus,
    pub estimated_minutes: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkStatusItem {
    pub order_id: Uuid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkStatusResult {
    pub items: Vec<BulkStatusItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
