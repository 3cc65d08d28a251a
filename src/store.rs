//! Persistence for blog posts.

use crate::entity::post;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema, Set,
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

/// Default number of posts returned by a list request.
pub const DEFAULT_COUNT: u64 = 100;
/// Upper bound on the number of posts returned by a list request.
pub const MAX_COUNT: u64 = 1000;

/// Errors returned by the post store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("post not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(DbErr),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated => StoreError::NotFound,
            err => StoreError::Database(err),
        }
    }
}

/// Fields required to create a post.
#[derive(Clone, Debug)]
pub struct NewPost {
    pub title: String,
    pub content: String,
}

/// Fields to overwrite on an existing post. Absent fields are left as is.
#[derive(Clone, Debug, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Attributes a list can be sorted by.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SortField {
    Id,
    Title,
    Content,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// Look up a field by its JSON attribute name.
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Self::Id),
            "title" => Some(Self::Title),
            "content" => Some(Self::Content),
            "createdAt" => Some(Self::CreatedAt),
            "updatedAt" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    fn column(self) -> post::Column {
        match self {
            Self::Id => post::Column::Id,
            Self::Title => post::Column::Title,
            Self::Content => post::Column::Content,
            Self::CreatedAt => post::Column::CreatedAt,
            Self::UpdatedAt => post::Column::UpdatedAt,
        }
    }
}

/// A single ordering term of a list request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub descending: bool,
}

/// Filtering, ordering, and paging of a list request.
#[derive(Clone, Debug, PartialEq)]
pub struct ListQuery {
    pub offset: u64,
    pub count: u64,
    /// Substring matched against title and content.
    pub search: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub sort: Vec<Sort>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            count: DEFAULT_COUNT,
            search: None,
            title: None,
            content: None,
            sort: Vec::new(),
        }
    }
}

/// One page of a list request.
#[derive(Clone, Debug)]
pub struct Page {
    pub items: Vec<post::Model>,
    pub offset: u64,
    /// Number of posts matching the filters, ignoring paging.
    pub total: u64,
}

impl Page {
    /// The value of the `Content-Range` header describing this page.
    pub fn content_range(&self) -> String {
        match self.items.len() as u64 {
            0 => format!("items */{}", self.total),
            len => format!(
                "items {}-{}/{}",
                self.offset,
                self.offset + len - 1,
                self.total
            ),
        }
    }
}

/// The `posts` table.
#[derive(Clone, Debug)]
pub struct PostStore {
    db: DatabaseConnection,
}

impl PostStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the `posts` table if it does not exist yet.
    pub async fn sync(&self) -> Result<(), DbErr> {
        let backend = self.db.get_database_backend();

        let mut table = Schema::new(backend).create_table_from_entity(post::Entity);
        table.if_not_exists();
        self.db.execute(backend.build(&table)).await?;

        info!("posts table synchronized");
        Ok(())
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page, StoreError> {
        let mut select = post::Entity::find();

        if let Some(term) = &query.search {
            select = select.filter(
                Condition::any()
                    .add(post::Column::Title.contains(term.as_str()))
                    .add(post::Column::Content.contains(term.as_str())),
            );
        }
        if let Some(title) = &query.title {
            select = select.filter(post::Column::Title.eq(title.as_str()));
        }
        if let Some(content) = &query.content {
            select = select.filter(post::Column::Content.eq(content.as_str()));
        }

        let total = select.clone().count(&self.db).await?;

        for sort in &query.sort {
            let order = if sort.descending {
                Order::Desc
            } else {
                Order::Asc
            };
            select = select.order_by(sort.field.column(), order);
        }

        let items = select
            .order_by_asc(post::Column::Id)
            .offset(query.offset)
            .limit(query.count)
            .all(&self.db)
            .await?;

        Ok(Page {
            items,
            offset: query.offset,
            total,
        })
    }

    pub async fn get(&self, id: i32) -> Result<post::Model, StoreError> {
        post::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn create(&self, new: NewPost) -> Result<post::Model, StoreError> {
        let now = OffsetDateTime::now_utc();

        let model = post::ActiveModel {
            title: Set(new.title),
            content: Set(new.content),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(model)
    }

    pub async fn update(&self, id: i32, changes: PostChanges) -> Result<post::Model, StoreError> {
        let mut active: post::ActiveModel = self.get(id).await?.into();

        if let Some(title) = changes.title {
            active.title = Set(title);
        }
        if let Some(content) = changes.content {
            active.content = Set(content);
        }
        active.updated_at = Set(OffsetDateTime::now_utc());

        Ok(active.update(&self.db).await?)
    }

    pub async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let result = post::Entity::delete_by_id(id).exec(&self.db).await?;

        if result.rows_affected == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    /// Number of stored posts.
    pub async fn count(&self) -> Result<u64, StoreError> {
        Ok(post::Entity::find().count(&self.db).await?)
    }

    /// Close the underlying connection pool.
    pub async fn close(self) -> Result<(), DbErr> {
        self.db.close().await
    }
}

/// A private in-memory SQLite database.
#[cfg(test)]
pub(crate) async fn memory_database() -> DatabaseConnection {
    use sea_orm::{ConnectOptions, Database};

    let mut options = ConnectOptions::new("sqlite::memory:");
    // every pooled connection would otherwise get its own database
    options.max_connections(1).min_connections(1);

    Database::connect(options).await.expect("connect sqlite")
}

/// An empty store backed by a private in-memory SQLite database.
#[cfg(test)]
pub(crate) async fn memory_store() -> PostStore {
    let store = PostStore::new(memory_database().await);
    store.sync().await.expect("sync schema");
    store
}
