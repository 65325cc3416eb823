use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use thiserror::Error;
use tracing::info;

use crate::crawler::models::Apartment;

const SCHEMA_DDL: &str = r#"
CREATE SCHEMA IF NOT EXISTS kv_apartments;

CREATE TABLE IF NOT EXISTS kv_apartments.apartments (
    apartment_id     SERIAL PRIMARY KEY,
    apurl            TEXT UNIQUE NOT NULL,
    raw_address      TEXT,
    street           TEXT,
    subdistrict      TEXT,
    district         TEXT,
    city             TEXT,
    parish           TEXT,
    price            INTEGER,
    price_per_m2     INTEGER,
    rooms            TEXT,
    bedrooms         TEXT,
    total_area       TEXT,
    floor            TEXT,
    built_year       TEXT,
    cadastre_no      TEXT,
    energy_mark      TEXT,
    utilities_summer TEXT,
    utilities_winter TEXT,
    ownership_form   TEXT,
    condition        TEXT,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS kv_apartments.images (
    id           SERIAL PRIMARY KEY,
    apartment_id INTEGER NOT NULL REFERENCES kv_apartments.apartments (apartment_id),
    image        TEXT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// Persistence seam for the crawl. The relational store behind it is the
/// dedup source of truth.
#[async_trait]
pub trait ApartmentRepository: Send + Sync {
    async fn exists(&self, url: &str) -> Result<bool, RepoError>;

    /// Saves the whole batch in one transaction: a failure on any record
    /// rolls back every record of the batch.
    async fn save_batch(&self, apartments: &[Apartment]) -> Result<usize, RepoError>;
}

pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Connects and brings the schema up; the DDL is idempotent.
    pub async fn connect(database_url: &str) -> Result<Self, RepoError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::raw_sql(SCHEMA_DDL).execute(&pool).await?;
        info!("Apartment schema ready");

        Ok(Self { pool })
    }

    async fn insert_apartment(
        tx: &mut Transaction<'_, Postgres>,
        apartment: &Apartment,
    ) -> Result<i32, RepoError> {
        let row = sqlx::query(
            r#"
            INSERT INTO kv_apartments.apartments (
                apurl, raw_address, street, subdistrict, district, city, parish,
                price, price_per_m2, rooms, bedrooms, total_area, floor,
                built_year, cadastre_no, energy_mark, utilities_summer,
                utilities_winter, ownership_form, condition
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            RETURNING apartment_id
            "#,
        )
        .bind(&apartment.apurl)
        .bind(&apartment.raw_address)
        .bind(&apartment.street)
        .bind(&apartment.subdistrict)
        .bind(&apartment.district)
        .bind(&apartment.city)
        .bind(&apartment.parish)
        .bind(apartment.price)
        .bind(apartment.price_per_m2)
        .bind(&apartment.rooms)
        .bind(&apartment.bedrooms)
        .bind(&apartment.total_area)
        .bind(&apartment.floor)
        .bind(&apartment.built_year)
        .bind(&apartment.cadastre_no)
        .bind(&apartment.energy_mark)
        .bind(&apartment.utilities_summer)
        .bind(&apartment.utilities_winter)
        .bind(&apartment.ownership_form)
        .bind(&apartment.condition)
        .fetch_one(&mut **tx)
        .await?;

        let apartment_id: i32 = row.try_get("apartment_id")?;

        for image in &apartment.images {
            sqlx::query("INSERT INTO kv_apartments.images (apartment_id, image) VALUES ($1, $2)")
                .bind(apartment_id)
                .bind(image)
                .execute(&mut **tx)
                .await?;
        }

        Ok(apartment_id)
    }
}

#[async_trait]
impl ApartmentRepository for PgRepository {
    async fn exists(&self, url: &str) -> Result<bool, RepoError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM kv_apartments.apartments WHERE apurl = $1)",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<bool, _>(0)?)
    }

    async fn save_batch(&self, apartments: &[Apartment]) -> Result<usize, RepoError> {
        let mut tx = self.pool.begin().await?;
        let mut saved = 0usize;

        for apartment in apartments {
            match Self::insert_apartment(&mut tx, apartment).await {
                Ok(_) => saved += 1,
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e);
                }
            }
        }

        tx.commit().await?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_url(tag: &str) -> String {
        format!(
            "https://www.kv.ee/en/apartment/test-{tag}-{}",
            chrono::Local::now().format("%Y%m%d%H%M%S%f")
        )
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL via DATABASE_URL"]
    async fn batch_failure_rolls_back_every_record() {
        let database_url = std::env::var("DATABASE_URL").unwrap();
        let repo = PgRepository::connect(&database_url).await.unwrap();

        let known = Apartment::new(&unique_url("known"));
        repo.save_batch(std::slice::from_ref(&known)).await.unwrap();
        assert!(repo.exists(&known.apurl).await.unwrap());

        // Second record violates the unique URL constraint, so the first
        // record of this batch must not survive either.
        let fresh = Apartment::new(&unique_url("fresh"));
        let batch = vec![fresh.clone(), known.clone()];
        assert!(repo.save_batch(&batch).await.is_err());
        assert!(!repo.exists(&fresh.apurl).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL via DATABASE_URL"]
    async fn images_land_with_their_parent() {
        let database_url = std::env::var("DATABASE_URL").unwrap();
        let repo = PgRepository::connect(&database_url).await.unwrap();

        let mut apartment = Apartment::new(&unique_url("images"));
        apartment.images = vec![
            "https://img.kv.ee/1.jpg".to_string(),
            "https://img.kv.ee/2.jpg".to_string(),
        ];

        let saved = repo
            .save_batch(std::slice::from_ref(&apartment))
            .await
            .unwrap();
        assert_eq!(saved, 1);
        assert!(repo.exists(&apartment.apurl).await.unwrap());
    }
}
