use utoipa::{
    Modify, OpenApi,
    openapi::OpenApi as OpenApiSpec,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{SessionRequest, SessionResponse},
        orders::{
            BulkStatusItem, BulkStatusRequest, BulkStatusResult, CancelOrderRequest,
            CreateOrderItem, CreateOrderRequest, OrderList, OrderWithItems,
            UpdateOrderStatusRequest,
        },
        payments::{
            CashPaymentRequest, CreatePaymentRequest, PaymentWithRefunds, RefundRequest,
            TerminalPaymentRequest,
        },
        workforce::{
            ClockInRequest, ClockOutRequest, ConsumeInviteRequest, ConsumeInviteResponse,
            CreateEmployeeRequest, CreateInviteRequest, EmployeeList, PayrollSummary,
            ScheduleShiftRequest, ShiftList, UpdateEmployeeRequest,
        },
    },
    models::{
        DeliveryType, Employee, EmployeeRole, InviteStatus, InviteToken, Order, OrderItem,
        OrderStatus, Payment, PaymentMethod, PaymentStatus, Principal, Refund, Role, Shift,
        ShiftStatus,
    },
    response::{ApiResponse, Meta},
    routes::{auth, employees, health, orders, params, payments},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::create_session,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::update_status,
        orders::cancel_order,
        orders::bulk_status,
        payments::create_payment,
        payments::cash_payment,
        payments::terminal_payment,
        payments::get_payment,
        payments::refund_payment,
        payments::provider_webhook,
        employees::list_employees,
        employees::create_employee,
        employees::update_employee,
        employees::create_invite,
        employees::consume_invite,
        employees::list_shifts,
        employees::schedule_shift,
        employees::clock_in,
        employees::clock_out,
        employees::payroll
    ),
    components(
        schemas(
            Principal,
            Role,
            Order,
            OrderItem,
            OrderStatus,
            DeliveryType,
            Payment,
            PaymentMethod,
            PaymentStatus,
            Refund,
            Employee,
            EmployeeRole,
            Shift,
            ShiftStatus,
            InviteToken,
            InviteStatus,
            SessionRequest,
            SessionResponse,
            CreateOrderRequest,
            CreateOrderItem,
            UpdateOrderStatusRequest,
            CancelOrderRequest,
            BulkStatusRequest,
            BulkStatusItem,
            BulkStatusResult,
            OrderList,
            OrderWithItems,
            CreatePaymentRequest,
            CashPaymentRequest,
            TerminalPaymentRequest,
            RefundRequest,
            PaymentWithRefunds,
            CreateEmployeeRequest,
            UpdateEmployeeRequest,
            EmployeeList,
            CreateInviteRequest,
            ConsumeInviteRequest,
            ConsumeInviteResponse,
            ScheduleShiftRequest,
            ShiftList,
            ClockInRequest,
            ClockOutRequest,
            PayrollSummary,
            params::Pagination,
            params::OrderListQuery,
            employees::EmployeeListQuery,
            Meta,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<Payment>,
            ApiResponse<PaymentWithRefunds>,
            ApiResponse<EmployeeList>,
            ApiResponse<ShiftList>
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Session bootstrap"),
        (name = "Orders", description = "Order lifecycle"),
        (name = "Payments", description = "Payments, refunds and provider webhooks"),
        (name = "Employees", description = "Workforce: employees, invites, shifts, payroll"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut OpenApiSpec) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
