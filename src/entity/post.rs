//! The blog post entity.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

/// A row of the `posts` table.
///
/// | Column     | Type          | Description                         |
/// |------------|---------------|-------------------------------------|
/// | id         | INTEGER (PK)  | Assigned by the database            |
/// | title      | TEXT          | Post title                          |
/// | content    | TEXT          | Post body                           |
/// | created_at | TIMESTAMPTZ   | Set once on insert                  |
/// | updated_at | TIMESTAMPTZ   | Refreshed on every update           |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "posts")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_type = "Text")]
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
