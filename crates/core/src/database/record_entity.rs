use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "kv_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value: Vec<u8>,
    pub version: i64,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::types::Record {
    fn from(model: Model) -> Self {
        crate::types::Record {
            key: model.key,
            value: bytes::Bytes::from(model.value),
            version: model.version.max(0) as u64,
            updated_at: chrono::TimeZone::from_utc_datetime(&chrono::Utc, &model.updated_at),
        }
    }
}
