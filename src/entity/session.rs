//! The browser session entity.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// A row of the `sessions` table.
///
/// | Column      | Type          | Description                         |
/// |-------------|---------------|-------------------------------------|
/// | id          | TEXT (PK)     | Session id, as sent in the cookie   |
/// | data        | BLOB          | MessagePack encoded session record  |
/// | expiry_date | TIMESTAMPTZ   | Record is ignored after this moment |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Blob")]
    pub data: Vec<u8>,
    pub expiry_date: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
