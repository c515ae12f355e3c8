use sea_orm::entity::prelude::*;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "restaurants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub foodcourt_id: Uuid,
    pub owner_principal_id: Uuid,
    pub name: String,
    pub timezone: Option<String>,
    pub commission_rate_bps: i32,
    pub published: bool,
    pub location: Option<Value>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::foodcourts::Entity",
        from = "Column::FoodcourtId",
        to = "super::foodcourts::Column::Id"
    )]
    Foodcourts,
    #[sea_orm(
        belongs_to = "super::principals::Entity",
        from = "Column::OwnerPrincipalId",
        to = "super::principals::Column::Id"
    )]
    Principals,
    #[sea_orm(has_many = "super::orders::Entity")]
    Orders,
    #[sea_orm(has_many = "super::employees::Entity")]
    Employees,
}

impl Related<super::foodcourts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Foodcourts.def()
    }
}

impl Related<super::principals::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Principals.def()
    }
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl Related<super::employees::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Employees.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
