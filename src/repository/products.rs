use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::{Product, ProductCategory, ProductCreate, ProductPhoto};

const COLUMNS: &str = "id, producer_id, category_id, name, description, availability_type, \
                       availability_start_month, availability_end_month, created_at, updated_at";

const PHOTO_COLUMNS: &str = "id, product_id, image_file, created_at";

const CATEGORY_COLUMNS: &str = "id, name, icon, display_name, position";

pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn categories(&self) -> Result<Vec<ProductCategory>, sqlx::Error> {
        sqlx::query_as::<_, ProductCategory>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM product_categories ORDER BY position, name"
        ))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn find_category(&self, id: i64) -> Result<Option<ProductCategory>, sqlx::Error> {
        sqlx::query_as::<_, ProductCategory>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM product_categories WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn categories_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<Vec<ProductCategory>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {CATEGORY_COLUMNS} FROM product_categories WHERE id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        query.push(")");
        query
            .build_query_as::<ProductCategory>()
            .fetch_all(&self.pool)
            .await
    }

    pub async fn create(
        &self,
        producer_id: i64,
        req: &ProductCreate,
    ) -> Result<Product, sqlx::Error> {
        let now = Utc::now();
        // Month fields are only meaningful for a custom period.
        let (start, end) = match req.availability_type {
            crate::models::Availability::Custom => {
                (req.availability_start_month, req.availability_end_month)
            }
            crate::models::Availability::AllYear => (None, None),
        };
        sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products
             (producer_id, category_id, name, description, availability_type,
              availability_start_month, availability_end_month, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        ))
        .bind(producer_id)
        .bind(req.category_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.availability_type)
        .bind(start)
        .bind(end)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!("SELECT {COLUMNS} FROM products WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list(
        &self,
        producer_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Product>, i64), sqlx::Error> {
        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM products WHERE 1=1"));
        if let Some(producer_id) = producer_id {
            query.push(" AND producer_id = ").push_bind(producer_id);
        }
        query.push(" ORDER BY created_at DESC");
        query.push(" LIMIT ").push_bind(limit);
        query.push(" OFFSET ").push_bind(offset);
        let products = query
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;

        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM products WHERE 1=1");
        if let Some(producer_id) = producer_id {
            count_query.push(" AND producer_id = ").push_bind(producer_id);
        }
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok((products, count))
    }

    pub async fn for_producers(&self, producer_ids: &[i64]) -> Result<Vec<Product>, sqlx::Error> {
        if producer_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM products WHERE producer_id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in producer_ids {
            separated.push_bind(id);
        }
        query.push(") ORDER BY created_at DESC");
        query.build_query_as::<Product>().fetch_all(&self.pool).await
    }

    /// Full-row update; callers merge the patch into the fetched row.
    pub async fn update(&self, product: &Product) -> Result<Product, sqlx::Error> {
        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET
               category_id = ?, name = ?, description = ?, availability_type = ?,
               availability_start_month = ?, availability_end_month = ?, updated_at = ?
             WHERE id = ?
             RETURNING {COLUMNS}"
        ))
        .bind(product.category_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.availability_type)
        .bind(product.availability_start_month)
        .bind(product.availability_end_month)
        .bind(Utc::now())
        .bind(product.id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn add_photo(
        &self,
        product_id: i64,
        image_file: &str,
    ) -> Result<ProductPhoto, sqlx::Error> {
        sqlx::query_as::<_, ProductPhoto>(&format!(
            "INSERT INTO product_photos (product_id, image_file, created_at)
             VALUES (?, ?, ?)
             RETURNING {PHOTO_COLUMNS}"
        ))
        .bind(product_id)
        .bind(image_file)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find_photo(&self, id: i64) -> Result<Option<ProductPhoto>, sqlx::Error> {
        sqlx::query_as::<_, ProductPhoto>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM product_photos WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete_photo(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM product_photos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_photos(&self, product_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM product_photos WHERE product_id = ?")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn photos_for_products(
        &self,
        product_ids: &[i64],
    ) -> Result<Vec<ProductPhoto>, sqlx::Error> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PHOTO_COLUMNS} FROM product_photos WHERE product_id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in product_ids {
            separated.push_bind(id);
        }
        query.push(") ORDER BY created_at");
        query
            .build_query_as::<ProductPhoto>()
            .fetch_all(&self.pool)
            .await
    }
}
