use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    entity::{employees, restaurants},
    error::{AppError, AppResult},
    middleware::auth::AuthPrincipal,
    models::{EmployeeRole, OrderStatus, Role},
};

/// Actions subject to the role/scope matrix. One `authorize` call sits at the
/// top of every command handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    CreateOrder,
    ReadOrder,
    TransitionOrder,
    CancelOrder,
    CreatePayment,
    ProcessCashOrTerminal,
    RefundPayment,
    ManageEmployees,
    ReadEmployees,
    ScheduleShift,
    ClockInOut,
    CreateInvite,
    ConsumeInvite,
}

/// The resource an action targets, reduced to the fields the matrix needs.
#[derive(Debug, Clone, Copy)]
pub enum Resource {
    Order {
        restaurant_id: Uuid,
        customer_principal_id: Option<Uuid>,
        status: OrderStatus,
    },
    Restaurant {
        restaurant_id: Uuid,
    },
    Employee {
        restaurant_id: Uuid,
        principal_id: Option<Uuid>,
    },
    /// Actions with no restaurant scope (invite consumption).
    Unscoped,
}

impl Resource {
    fn restaurant_id(&self) -> Option<Uuid> {
        match self {
            Resource::Order { restaurant_id, .. }
            | Resource::Restaurant { restaurant_id }
            | Resource::Employee { restaurant_id, .. } => Some(*restaurant_id),
            Resource::Unscoped => None,
        }
    }
}

/// Role gate before any scope lookup. A `false` here is a hard deny for the
/// role regardless of scope.
pub fn role_permits(role: Role, verb: Verb) -> bool {
    use Verb::*;
    match role {
        Role::Superadmin => !matches!(verb, ConsumeInvite),
        Role::RestaurantOwner => !matches!(verb, ConsumeInvite),
        Role::Employee => matches!(
            verb,
            CreateOrder | ReadOrder | TransitionOrder | CancelOrder | CreatePayment
                | ProcessCashOrTerminal | ReadEmployees | ScheduleShift | ClockInOut
        ),
        Role::Customer => matches!(
            verb,
            CreateOrder | ReadOrder | CancelOrder | CreatePayment | ConsumeInvite
        ),
    }
}

/// Enforce the role/scope matrix: role gate, then scope resolution
/// against restaurant ownership / employee assignment rows.
pub async fn authorize<C: ConnectionTrait>(
    conn: &C,
    auth: &AuthPrincipal,
    verb: Verb,
    resource: Resource,
) -> AppResult<()> {
    if !role_permits(auth.role, verb) {
        return Err(AppError::Forbidden);
    }

    match auth.role {
        Role::Superadmin => Ok(()),

        Role::RestaurantOwner => {
            let Some(restaurant_id) = resource.restaurant_id() else {
                return Err(AppError::Forbidden);
            };
            if owns_restaurant(conn, auth.id, restaurant_id).await? {
                Ok(())
            } else {
                Err(AppError::Forbidden)
            }
        }

        Role::Employee => {
            let Some(restaurant_id) = resource.restaurant_id() else {
                return Err(AppError::Forbidden);
            };
            let Some(assignment) = assignment_for(conn, auth.id, restaurant_id).await? else {
                return Err(AppError::Forbidden);
            };
            match verb {
                // Clock-in/out is self-service only for employees.
                Verb::ClockInOut => match resource {
                    Resource::Employee { principal_id, .. } if principal_id == Some(auth.id) => {
                        Ok(())
                    }
                    _ => Err(AppError::Forbidden),
                },
                // Scheduling is reserved for managers among staff.
                Verb::ScheduleShift => {
                    if assignment.employee_role == EmployeeRole::Manager.as_str() {
                        Ok(())
                    } else {
                        Err(AppError::Forbidden)
                    }
                }
                _ => Ok(()),
            }
        }

        Role::Customer => match (verb, resource) {
            (Verb::ConsumeInvite, _) => Ok(()),
            // Customers may place orders at any published restaurant; the
            // created order is bound to their principal.
            (Verb::CreateOrder, _) => Ok(()),
            (
                Verb::ReadOrder | Verb::CreatePayment,
                Resource::Order {
                    customer_principal_id,
                    ..
                },
            ) if customer_principal_id == Some(auth.id) => Ok(()),
            (
                Verb::CancelOrder,
                Resource::Order {
                    customer_principal_id,
                    status,
                    ..
                },
            ) if customer_principal_id == Some(auth.id) && status == OrderStatus::Pending => Ok(()),
            _ => Err(AppError::Forbidden),
        },
    }
}

async fn owns_restaurant<C: ConnectionTrait>(
    conn: &C,
    principal_id: Uuid,
    restaurant_id: Uuid,
) -> AppResult<bool> {
    let restaurant = restaurants::Entity::find_by_id(restaurant_id)
        .one(conn)
        .await?;
    Ok(restaurant
        .map(|r| r.owner_principal_id == principal_id)
        .unwrap_or(false))
}

async fn assignment_for<C: ConnectionTrait>(
    conn: &C,
    principal_id: Uuid,
    restaurant_id: Uuid,
) -> AppResult<Option<employees::Model>> {
    let assignment = employees::Entity::find()
        .filter(employees::Column::PrincipalId.eq(principal_id))
        .filter(employees::Column::RestaurantId.eq(restaurant_id))
        .filter(employees::Column::Active.eq(true))
        .one(conn)
        .await?;
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superadmin_passes_role_gate_everywhere_except_consume() {
        for verb in [
            Verb::ReadOrder,
            Verb::TransitionOrder,
            Verb::CancelOrder,
            Verb::CreatePayment,
            Verb::ProcessCashOrTerminal,
            Verb::RefundPayment,
            Verb::ManageEmployees,
            Verb::ClockInOut,
            Verb::CreateInvite,
        ] {
            assert!(role_permits(Role::Superadmin, verb), "{verb:?}");
        }
        assert!(!role_permits(Role::Superadmin, Verb::ConsumeInvite));
    }

    #[test]
    fn employee_role_gate_matches_matrix() {
        assert!(role_permits(Role::Employee, Verb::TransitionOrder));
        assert!(role_permits(Role::Employee, Verb::ProcessCashOrTerminal));
        assert!(role_permits(Role::Employee, Verb::ClockInOut));
        assert!(!role_permits(Role::Employee, Verb::RefundPayment));
        assert!(!role_permits(Role::Employee, Verb::ManageEmployees));
        assert!(!role_permits(Role::Employee, Verb::CreateInvite));
    }

    #[test]
    fn customer_role_gate_matches_matrix() {
        assert!(role_permits(Role::Customer, Verb::ReadOrder));
        assert!(role_permits(Role::Customer, Verb::CancelOrder));
        assert!(role_permits(Role::Customer, Verb::CreatePayment));
        assert!(role_permits(Role::Customer, Verb::ConsumeInvite));
        assert!(!role_permits(Role::Customer, Verb::TransitionOrder));
        assert!(!role_permits(Role::Customer, Verb::ProcessCashOrTerminal));
        assert!(!role_permits(Role::Customer, Verb::RefundPayment));
        assert!(!role_permits(Role::Customer, Verb::ClockInOut));
    }
}
