use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    geo::BoundingBox,
    models::{Producer, ProducerCreate, ProducerPhoto},
};

const COLUMNS: &str = "id, user_id, name, description, category, address, latitude, longitude, \
                       phone, email_contact, website, opening_hours, created_at, updated_at";

const PHOTO_COLUMNS: &str = "id, producer_id, image_file, created_at";

/// Filters accepted by the list endpoint. Category strings are matched
/// verbatim; an unknown category simply matches nothing.
#[derive(Debug, Default)]
pub struct ProducerListFilter {
    pub category: Option<String>,
    pub categories: Vec<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

impl ProducerListFilter {
    fn apply(&self, query: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(category) = &self.category {
            query.push(" AND category = ").push_bind(category.clone());
        }
        if !self.categories.is_empty() {
            query.push(" AND category IN (");
            let mut separated = query.separated(", ");
            for category in &self.categories {
                separated.push_bind(category.clone());
            }
            query.push(")");
        }
        if let Some(search) = &self.search {
            let pattern = format!("%{search}%");
            query
                .push(" AND (name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR description LIKE ")
                .push_bind(pattern.clone())
                .push(" OR address LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    /// Whitelisted ordering clauses; anything else falls back to the
    /// default newest-first.
    fn order_clause(&self) -> &'static str {
        match self.ordering.as_deref() {
            Some("created_at") => " ORDER BY created_at ASC",
            Some("name") => " ORDER BY name COLLATE NOCASE ASC",
            Some("-name") => " ORDER BY name COLLATE NOCASE DESC",
            _ => " ORDER BY created_at DESC",
        }
    }
}

pub struct ProducerRepository {
    pool: SqlitePool,
}

impl ProducerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        req: &ProducerCreate,
        latitude: f64,
        longitude: f64,
    ) -> Result<Producer, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Producer>(&format!(
            "INSERT INTO producers
             (user_id, name, description, category, address, latitude, longitude,
              phone, email_contact, website, opening_hours, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        ))
        .bind(user_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.category)
        .bind(&req.address)
        .bind(latitude)
        .bind(longitude)
        .bind(&req.phone)
        .bind(&req.email_contact)
        .bind(&req.website)
        .bind(&req.opening_hours)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Producer>, sqlx::Error> {
        sqlx::query_as::<_, Producer>(&format!("SELECT {COLUMNS} FROM producers WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Producer>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM producers WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        query.push(")");
        query
            .build_query_as::<Producer>()
            .fetch_all(&self.pool)
            .await
    }

    pub async fn find_by_user(&self, user_id: i64) -> Result<Option<Producer>, sqlx::Error> {
        sqlx::query_as::<_, Producer>(&format!(
            "SELECT {COLUMNS} FROM producers WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list(
        &self,
        filter: &ProducerListFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Producer>, i64), sqlx::Error> {
        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM producers WHERE 1=1"));
        filter.apply(&mut query);
        query.push(filter.order_clause());
        query.push(" LIMIT ").push_bind(limit);
        query.push(" OFFSET ").push_bind(offset);
        let producers = query
            .build_query_as::<Producer>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_query =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM producers WHERE 1=1");
        filter.apply(&mut count_query);
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok((producers, count))
    }

    /// Bounding-box pre-filter for the nearby search, ordered by id so
    /// the later distance sort has a stable input.
    pub async fn find_in_bbox(
        &self,
        bbox: &BoundingBox,
        categories: &[String],
    ) -> Result<Vec<Producer>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM producers WHERE latitude BETWEEN "
        ));
        query.push_bind(bbox.min_lat);
        query.push(" AND ").push_bind(bbox.max_lat);
        query.push(" AND longitude BETWEEN ").push_bind(bbox.min_lon);
        query.push(" AND ").push_bind(bbox.max_lon);
        if !categories.is_empty() {
            query.push(" AND category IN (");
            let mut separated = query.separated(", ");
            for category in categories {
                separated.push_bind(category.clone());
            }
            query.push(")");
        }
        query.push(" ORDER BY id");

        query.build_query_as::<Producer>().fetch_all(&self.pool).await
    }

    /// Full-row update; callers merge the patch into the fetched row.
    pub async fn update(&self, producer: &Producer) -> Result<Producer, sqlx::Error> {
        sqlx::query_as::<_, Producer>(&format!(
            "UPDATE producers SET
               name = ?, description = ?, category = ?, address = ?,
               latitude = ?, longitude = ?, phone = ?, email_contact = ?,
               website = ?, opening_hours = ?, updated_at = ?
             WHERE id = ?
             RETURNING {COLUMNS}"
        ))
        .bind(&producer.name)
        .bind(&producer.description)
        .bind(producer.category)
        .bind(&producer.address)
        .bind(producer.latitude)
        .bind(producer.longitude)
        .bind(&producer.phone)
        .bind(&producer.email_contact)
        .bind(&producer.website)
        .bind(&producer.opening_hours)
        .bind(Utc::now())
        .bind(producer.id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM producers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn add_photo(
        &self,
        producer_id: i64,
        image_file: &str,
    ) -> Result<ProducerPhoto, sqlx::Error> {
        sqlx::query_as::<_, ProducerPhoto>(&format!(
            "INSERT INTO producer_photos (producer_id, image_file, created_at)
             VALUES (?, ?, ?)
             RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(producer_id)
        .bind(image_file)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find_photo(&self, id: i64) -> Result<Option<ProducerPhoto>, sqlx::Error> {
        sqlx::query_as::<_, ProducerPhoto>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM producer_photos WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete_photo(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM producer_photos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn photos_for_producers(
        &self,
        producer_ids: &[i64],
    ) -> Result<Vec<ProducerPhoto>, sqlx::Error> {
        if producer_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PHOTO_COLUMNS} FROM producer_photos WHERE producer_id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in producer_ids {
            separated.push_bind(id);
        }
        query.push(") ORDER BY created_at DESC");

        query
            .build_query_as::<ProducerPhoto>()
            .fetch_all(&self.pool)
            .await
    }
}
