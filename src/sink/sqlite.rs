use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use rusqlite_migration::{Migrations, M};

use crate::domain::Listing;
use crate::sink::{PriceRow, Sink, SinkError, SourceStats};

/// Relational sink backed by sqlite.
///
/// Products and stores are keyed by natural name match; the unique
/// index on `(product_id, store_id)` makes the price upsert idempotent
/// without any locking above the storage layer.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, SinkError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, SinkError> {
        let sink = Self {
            conn: Mutex::new(conn),
        };
        sink.run_migrations()?;
        Ok(sink)
    }

    fn run_migrations(&self) -> Result<(), SinkError> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|_| SinkError::Database(rusqlite::Error::InvalidQuery))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        self.conn
            .lock()
            .map_err(|e| SinkError::Poisoned(e.to_string()))
    }

    fn find_or_create(tx: &Transaction<'_>, table: &str, name: &str) -> Result<i64, SinkError> {
        tx.execute(
            &format!("INSERT OR IGNORE INTO {table} (name, created_at) VALUES (?1, ?2)"),
            params![name, Utc::now().to_rfc3339()],
        )?;

        let id = tx.query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1"),
            params![name],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn upsert(
        &self,
        product_name: &str,
        store_name: &str,
        amount: f64,
        currency: &str,
        source: &str,
        image_url: Option<&str>,
        observed_at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let product_id = Self::find_or_create(&tx, "products", product_name)?;
        let store_id = Self::find_or_create(&tx, "stores", store_name)?;

        tx.execute(
            "INSERT INTO prices (product_id, store_id, amount, currency, source, image_url, first_seen_at, observed_at, observations)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 1)
             ON CONFLICT(product_id, store_id) DO UPDATE SET
                 amount = excluded.amount,
                 currency = excluded.currency,
                 source = excluded.source,
                 image_url = COALESCE(excluded.image_url, image_url),
                 observed_at = excluded.observed_at,
                 observations = observations + 1",
            params![
                product_id,
                store_id,
                amount,
                currency,
                source,
                image_url,
                observed_at.to_rfc3339()
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }
}

impl Sink for SqliteSink {
    fn upsert_price(
        &self,
        product_name: &str,
        store_name: &str,
        amount: f64,
        currency: &str,
        source: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<(), SinkError> {
        self.upsert(
            product_name,
            store_name,
            amount,
            currency,
            source,
            None,
            observed_at,
        )
    }

    fn upsert_listing(&self, listing: &Listing, store_name: &str) -> Result<(), SinkError> {
        self.upsert(
            &listing.product_name,
            store_name,
            listing.price_amount,
            &listing.currency,
            &listing.source_id,
            listing.image_url.as_deref(),
            listing.observed_at,
        )
    }

    fn list_prices(&self, source: Option<&str>) -> Result<Vec<PriceRow>, SinkError> {
        let conn = self.lock()?;

        let sql = "SELECT p.name, s.name, pr.amount, pr.currency, pr.source, pr.image_url, pr.observed_at, pr.observations
             FROM prices pr
             JOIN products p ON p.id = pr.product_id
             JOIN stores s ON s.id = pr.store_id
             WHERE ?1 IS NULL OR pr.source = ?1
             ORDER BY p.name, s.name";

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![source], |row| {
                Ok(PriceRow {
                    product_name: row.get(0)?,
                    store_name: row.get(1)?,
                    amount: row.get(2)?,
                    currency: row.get(3)?,
                    source: row.get(4)?,
                    image_url: row.get(5)?,
                    observed_at: row
                        .get::<_, String>(6)
                        .ok()
                        .and_then(|s| Self::parse_datetime(&s))
                        .unwrap_or_else(Utc::now),
                    observations: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn source_stats(&self) -> Result<Vec<SourceStats>, SinkError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*), MAX(observed_at)
             FROM prices GROUP BY source ORDER BY source",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SourceStats {
                    source: row.get(0)?,
                    listings: row.get(1)?,
                    last_observed_at: row
                        .get::<_, Option<String>>(2)?
                        .and_then(|s| Self::parse_datetime(&s)),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
