pub mod audit_logs;
pub mod dining_tables;
pub mod employees;
pub mod foodcourts;
pub mod invite_tokens;
pub mod leases;
pub mod order_items;
pub mod order_number_counters;
pub mod orders;
pub mod outbox;
pub mod payments;
pub mod principals;
pub mod processed_webhooks;
pub mod products;
pub mod refunds;
pub mod restaurants;
pub mod sessions;
pub mod shifts;

pub use audit_logs::Entity as AuditLogs;
pub use dining_tables::Entity as DiningTables;
pub use employees::Entity as Employees;
pub use foodcourts::Entity as Foodcourts;
pub use invite_tokens::Entity as InviteTokens;
pub use leases::Entity as Leases;
pub use order_items::Entity as OrderItems;
pub use order_number_counters::Entity as OrderNumberCounters;
pub use orders::Entity as Orders;
pub use outbox::Entity as Outbox;
pub use payments::Entity as Payments;
pub use principals::Entity as Principals;
pub use processed_webhooks::Entity as ProcessedWebhooks;
pub use products::Entity as Products;
pub use refunds::Entity as Refunds;
pub use restaurants::Entity as Restaurants;
pub use sessions::Entity as Sessions;
pub use shifts::Entity as Shifts;
