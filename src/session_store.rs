//! Server-side storage for `tower-sessions`.
//!
//! Session records live in the `sessions` table of the same database as the
//! posts, so they survive restarts and every process sharing the database
//! sees the same logins.

use std::time::Duration;

use crate::entity::session;
use crate::shutdown::Signal;

use async_trait::async_trait;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Schema, Set,
};
use time::OffsetDateTime;
use tower_sessions::{
    session::{Id, Record},
    session_store, ExpiredDeletion, SessionStore,
};
use tracing::{error, info};

fn backend(err: DbErr) -> session_store::Error {
    session_store::Error::Backend(err.to_string())
}

/// A `tower-sessions` store backed by sea-orm.
#[derive(Clone, Debug)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the `sessions` table if it does not exist yet.
    pub async fn sync(&self) -> Result<(), DbErr> {
        let backend = self.db.get_database_backend();

        let mut table = Schema::new(backend).create_table_from_entity(session::Entity);
        table.if_not_exists();
        self.db.execute(backend.build(&table)).await?;

        info!("sessions table synchronized");
        Ok(())
    }

    /// Delete expired sessions every `period` until shutdown is requested.
    pub async fn delete_expired_until(self, period: Duration, shutdown: Signal) {
        let mut interval = tokio::time::interval(period);
        let stop = shutdown.recv();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = interval.tick() => {
                    if let Err(e) = self.delete_expired().await {
                        error!("failed to delete expired sessions: {}", e);
                    }
                }
            }
        }
    }

    fn active_model(record: &Record) -> session_store::Result<session::ActiveModel> {
        let data =
            rmp_serde::to_vec(record).map_err(|e| session_store::Error::Encode(e.to_string()))?;

        Ok(session::ActiveModel {
            id: Set(record.id.to_string()),
            data: Set(data),
            expiry_date: Set(record.expiry_date),
        })
    }

    /// Number of stored records, expired or not.
    #[cfg(test)]
    pub(crate) async fn count(&self) -> u64 {
        use sea_orm::PaginatorTrait;

        session::Entity::find()
            .count(&self.db)
            .await
            .expect("count sessions")
    }
}

#[async_trait]
impl SessionStore for DatabaseStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        // ids are random, but a collision must never hand over someone's session
        while session::Entity::find_by_id(record.id.to_string())
            .one(&self.db)
            .await
            .map_err(backend)?
            .is_some()
        {
            record.id = Id::default();
        }

        session::Entity::insert(Self::active_model(record)?)
            .exec(&self.db)
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        session::Entity::insert(Self::active_model(record)?)
            .on_conflict(
                OnConflict::column(session::Column::Id)
                    .update_columns([session::Column::Data, session::Column::ExpiryDate])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let model = session::Entity::find_by_id(session_id.to_string())
            .filter(session::Column::ExpiryDate.gt(OffsetDateTime::now_utc()))
            .one(&self.db)
            .await
            .map_err(backend)?;

        model
            .map(|model| {
                rmp_serde::from_slice(&model.data)
                    .map_err(|e| session_store::Error::Decode(e.to_string()))
            })
            .transpose()
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        session::Entity::delete_by_id(session_id.to_string())
            .exec(&self.db)
            .await
            .map_err(backend)?;

        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for DatabaseStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let deleted = session::Entity::delete_many()
            .filter(session::Column::ExpiryDate.lte(OffsetDateTime::now_utc()))
            .exec(&self.db)
            .await
            .map_err(backend)?;

        if deleted.rows_affected > 0 {
            info!("deleted {} expired sessions", deleted.rows_affected);
        }
        Ok(())
    }
}
