use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Caller role resolved from the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    RestaurantOwner,
    Employee,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::RestaurantOwner => "restaurant_owner",
            Role::Employee => "employee",
            Role::Customer => "customer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "superadmin" => Some(Role::Superadmin),
            "restaurant_owner" => Some(Role::RestaurantOwner),
            "employee" => Some(Role::Employee),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    DineIn,
    Takeaway,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::DineIn => "dine_in",
            DeliveryType::Takeaway => "takeaway",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dine_in" => Some(DeliveryType::DineIn),
            "takeaway" => Some(DeliveryType::Takeaway),
            _ => None,
        }
    }
}

/// Order lifecycle. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "preparing" => Some(OrderStatus::Preparing),
            "ready" => Some(OrderStatus::Ready),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// The exhaustive transition table. Cancellation is reachable from any
    /// non-terminal state; terminal states accept nothing.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Preparing)
                | (Pending, Cancelled)
                | (Preparing, Ready)
                | (Preparing, Cancelled)
                | (Ready, Completed)
                | (Ready, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CardPspA,
    CardPspB,
    Cash,
    Terminal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CardPspA => "card_psp_a",
            PaymentMethod::CardPspB => "card_psp_b",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Terminal => "terminal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card_psp_a" => Some(PaymentMethod::CardPspA),
            "card_psp_b" => Some(PaymentMethod::CardPspB),
            "cash" => Some(PaymentMethod::Cash),
            "terminal" => Some(PaymentMethod::Terminal),
            _ => None,
        }
    }

    pub fn is_synchronous(&self) -> bool {
        matches!(self, PaymentMethod::Cash | PaymentMethod::Terminal)
    }
}

/// Payment lifecycle. `Completed`, `Failed` and `Refunded` are terminal for
/// incoming provider events; `Completed` may still move to `Refunded` via the
/// refund flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRole {
    Manager,
    Cashier,
    Cook,
    Waiter,
    Cleaner,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeRole::Manager => "manager",
            EmployeeRole::Cashier => "cashier",
            EmployeeRole::Cook => "cook",
            EmployeeRole::Waiter => "waiter",
            EmployeeRole::Cleaner => "cleaner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manager" => Some(EmployeeRole::Manager),
            "cashier" => Some(EmployeeRole::Cashier),
            "cook" => Some(EmployeeRole::Cook),
            "waiter" => Some(EmployeeRole::Waiter),
            "cleaner" => Some(EmployeeRole::Cleaner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Scheduled => "scheduled",
            ShiftStatus::Active => "active",
            ShiftStatus::Completed => "completed",
            ShiftStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(ShiftStatus::Scheduled),
            "active" => Some(ShiftStatus::Active),
            "completed" => Some(ShiftStatus::Completed),
            "cancelled" => Some(ShiftStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Active,
    Consumed,
    Expired,
    Revoked,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Active => "active",
            InviteStatus::Consumed => "consumed",
            InviteStatus::Expired => "expired",
            InviteStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(InviteStatus::Active),
            "consumed" => Some(InviteStatus::Consumed),
            "expired" => Some(InviteStatus::Expired),
            "revoked" => Some(InviteStatus::Revoked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub external_identity_id: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub restaurant_id: Uuid,
    pub table_id: Option<Uuid>,
    pub customer_principal_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_type: DeliveryType,
    pub total_minor: i64,
    pub status: OrderStatus,
    pub estimated_minutes: Option<i32>,
    pub special_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub variant_label: Option<String>,
    pub quantity: i32,
    pub unit_price_minor: i64,
    pub line_total_minor: i64,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub commission_minor: i64,
    pub net_minor: i64,
    pub provider_ref: Option<String>,
    pub redirect_url: Option<String>,
    pub provider_metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount_minor: i64,
    pub reason: String,
    pub provider_refund_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Employee {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub principal_id: Option<Uuid>,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub employee_role: EmployeeRole,
    pub hourly_wage_minor: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Shift {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub break_minutes: i32,
    pub status: ShiftStatus,
    pub pay_minor: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InviteToken {
    pub id: Uuid,
    pub token: String,
    pub restaurant_id: Uuid,
    pub granted_role: EmployeeRole,
    pub hourly_wage_minor: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
    pub used_count: i32,
    pub status: InviteStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_transition_table_is_exhaustive() {
        use OrderStatus::*;
        let all = [Pending, Preparing, Ready, Completed, Cancelled];
        let allowed = [
            (Pending, Preparing),
            (Pending, Cancelled),
            (Preparing, Ready),
            (Preparing, Cancelled),
            (Ready, Completed),
            (Ready, Cancelled),
        ];
        for from in all {
            for to in all {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn terminal_statuses_accept_nothing() {
        use OrderStatus::*;
        for to in [Pending, Preparing, Ready, Completed, Cancelled] {
            assert!(!Completed.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        for method in [
            PaymentMethod::CardPspA,
            PaymentMethod::CardPspB,
            PaymentMethod::Cash,
            PaymentMethod::Terminal,
        ] {
            assert_eq!(PaymentMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(OrderStatus::parse("unknown"), None);
    }

    #[test]
    fn synchronous_methods() {
        assert!(PaymentMethod::Cash.is_synchronous());
        assert!(PaymentMethod::Terminal.is_synchronous());
        assert!(!PaymentMethod::CardPspA.is_synchronous());
        assert!(!PaymentMethod::CardPspB.is_synchronous());
    }
}
