use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "dining_tables")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub foodcourt_id: Uuid,
    pub label: String,
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
}

impl Related<super::foodcourts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Foodcourts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
