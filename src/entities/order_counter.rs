use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-year sequence row behind public order numbers. Incremented with
/// an insert-or-conflict update so concurrent orders never share a seq.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub year: i32,
    pub seq: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
