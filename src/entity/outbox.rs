use sea_orm::entity::prelude::*;
use serde_json::Value;

/// Transactional outbox row. Appended in the same transaction as the state
/// change that produced the event; drained in `seq` order by the dispatcher.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub seq: i64,
    #[sea_orm(unique)]
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub kind: String,
    pub payload: Value,
    pub created_at: DateTimeWithTimeZone,
    pub published_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
