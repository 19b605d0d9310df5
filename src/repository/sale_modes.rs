use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::{OpeningHours, OpeningHoursIn, SaleMode, SaleModeCreate};

const COLUMNS: &str = "id, producer_id, mode_type, title, instructions, phone_number, \
                       website_url, is_24_7, location_address, location_latitude, \
                       location_longitude, market_info, position, created_at, updated_at";

const HOURS_COLUMNS: &str = "id, sale_mode_id, day_of_week, is_closed, opening_time, closing_time";

pub struct SaleModeRepository {
    pool: SqlitePool,
}

impl SaleModeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts the mode and its opening hours atomically.
    pub async fn create(
        &self,
        producer_id: i64,
        req: &SaleModeCreate,
    ) -> Result<(SaleMode, Vec<OpeningHours>), sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mode = sqlx::query_as::<_, SaleMode>(&format!(
            "INSERT INTO sale_modes
             (producer_id, mode_type, title, instructions, phone_number, website_url,
              is_24_7, location_address, location_latitude, location_longitude,
              market_info, position, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        ))
        .bind(producer_id)
        .bind(req.mode_type)
        .bind(&req.title)
        .bind(&req.instructions)
        .bind(&req.phone_number)
        .bind(&req.website_url)
        .bind(req.is_24_7)
        .bind(&req.location_address)
        .bind(req.location_latitude)
        .bind(req.location_longitude)
        .bind(&req.market_info)
        .bind(req.position)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut hours = Vec::with_capacity(req.opening_hours.len());
        for entry in &req.opening_hours {
            hours.push(insert_hours(&mut tx, mode.id, entry).await?);
        }

        tx.commit().await?;
        Ok((mode, hours))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<SaleMode>, sqlx::Error> {
        sqlx::query_as::<_, SaleMode>(&format!("SELECT {COLUMNS} FROM sale_modes WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn for_producer(&self, producer_id: i64) -> Result<Vec<SaleMode>, sqlx::Error> {
        sqlx::query_as::<_, SaleMode>(&format!(
            "SELECT {COLUMNS} FROM sale_modes WHERE producer_id = ? ORDER BY position, created_at"
        ))
        .bind(producer_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn for_producers(&self, producer_ids: &[i64]) -> Result<Vec<SaleMode>, sqlx::Error> {
        if producer_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM sale_modes WHERE producer_id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in producer_ids {
            separated.push_bind(id);
        }
        query.push(") ORDER BY position, created_at");
        query
            .build_query_as::<SaleMode>()
            .fetch_all(&self.pool)
            .await
    }

    pub async fn hours_for_modes(
        &self,
        mode_ids: &[i64],
    ) -> Result<Vec<OpeningHours>, sqlx::Error> {
        if mode_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {HOURS_COLUMNS} FROM opening_hours WHERE sale_mode_id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in mode_ids {
            separated.push_bind(id);
        }
        query.push(") ORDER BY day_of_week");
        query
            .build_query_as::<OpeningHours>()
            .fetch_all(&self.pool)
            .await
    }

    /// Full-row update. When `hours` is present the existing entries
    /// are replaced wholesale inside the same transaction.
    pub async fn update(
        &self,
        mode: &SaleMode,
        hours: Option<&[OpeningHoursIn]>,
    ) -> Result<(SaleMode, Vec<OpeningHours>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, SaleMode>(&format!(
            "UPDATE sale_modes SET
               mode_type = ?, title = ?, instructions = ?, phone_number = ?,
               website_url = ?, is_24_7 = ?, location_address = ?,
               location_latitude = ?, location_longitude = ?, market_info = ?,
               position = ?, updated_at = ?
             WHERE id = ?
             RETURNING {COLUMNS}"
        ))
        .bind(mode.mode_type)
        .bind(&mode.title)
        .bind(&mode.instructions)
        .bind(&mode.phone_number)
        .bind(&mode.website_url)
        .bind(mode.is_24_7)
        .bind(&mode.location_address)
        .bind(mode.location_latitude)
        .bind(mode.location_longitude)
        .bind(&mode.market_info)
        .bind(mode.position)
        .bind(Utc::now())
        .bind(mode.id)
        .fetch_one(&mut *tx)
        .await?;

        let stored_hours = match hours {
            Some(entries) => {
                sqlx::query("DELETE FROM opening_hours WHERE sale_mode_id = ?")
                    .bind(mode.id)
                    .execute(&mut *tx)
                    .await?;
                let mut stored = Vec::with_capacity(entries.len());
                for entry in entries {
                    stored.push(insert_hours(&mut tx, mode.id, entry).await?);
                }
                stored
            }
            None => {
                sqlx::query_as::<_, OpeningHours>(&format!(
                    "SELECT {HOURS_COLUMNS} FROM opening_hours
                     WHERE sale_mode_id = ? ORDER BY day_of_week"
                ))
                .bind(mode.id)
                .fetch_all(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok((updated, stored_hours))
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sale_modes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn insert_hours(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    sale_mode_id: i64,
    entry: &OpeningHoursIn,
) -> Result<OpeningHours, sqlx::Error> {
    sqlx::query_as::<_, OpeningHours>(&format!(
        "INSERT INTO opening_hours
         (sale_mode_id, day_of_week, is_closed, opening_time, closing_time)
         VALUES (?, ?, ?, ?, ?)
         RETURNING {HOURS_COLUMNS}"
    ))
    .bind(sale_mode_id)
    .bind(entry.day_of_week)
    .bind(entry.is_closed)
    .bind(&entry.opening_time)
    .bind(&entry.closing_time)
    .fetch_one(&mut **tx)
    .await
}
