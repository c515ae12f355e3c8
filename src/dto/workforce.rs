use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Employee, EmployeeRole, InviteToken, Shift};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateEmployeeRequest {
    pub restaurant_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub employee_role: EmployeeRole,
    pub hourly_wage_minor: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateEmployeeRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub employee_role: Option<EmployeeRole>,
    pub hourly_wage_minor: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeList {
    pub items: Vec<Employee>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateInviteRequest {
    pub restaurant_id: Uuid,
    pub granted_role: EmployeeRole,
    pub hourly_wage_minor: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConsumeInviteRequest {
    pub token: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsumeInviteResponse {
    pub employee: Employee,
    pub invite: InviteToken,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleShiftRequest {
    pub employee_id: Uuid,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    #[serde(default)]
    pub break_minutes: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShiftList {
    pub items: Vec<Shift>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClockInRequest {
    /// Staff clocking in on behalf of an employee; omitted means "my own
    /// employee record".
    pub employee_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClockOutRequest {
    pub employee_id: Option<Uuid>,
    /// Break taken during the shift, recorded at clock-out.
    pub break_minutes: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PayrollSummary {
    pub employee_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub shift_count: i64,
    pub total_minutes: i64,
    pub total_pay_minor: Option<i64>,
}
