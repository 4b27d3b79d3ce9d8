//! ABOUTME: Database layer with SQLite, migrations, and repositories
//! ABOUTME: Handles all marketplace persistence and database operations

use pm_core::{Error, Result};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Row, Sqlite, SqlitePool,
};
use tracing::{debug, info, instrument};

/// Allowed table names for statistics queries
/// Table names cannot be bound as parameters, so only these are ever interpolated
const ALLOWED_TABLES: &[&str] = &[
    "users",
    "products",
    "reviews",
    "orders",
    "order_items",
    "invoices",
    "payouts",
];

/// Default connection pool size
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Validates that a table name contains only safe SQL identifier characters
fn is_safe_sql_identifier(table: &str) -> bool {
    let mut chars = table.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Map a sqlx error to the core error, keeping uniqueness violations apart
///
/// Callers retry on `Conflict` when they generate a value that must be unique.
pub fn map_db_error(context: &str, err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return Error::Conflict(format!("{}: {}", context, db_err.message()));
        }
    }
    Error::Database(format!("{}: {}", context, err))
}

/// Database connection pool and operations
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Create a new database connection with migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::connect(db_path, DEFAULT_POOL_SIZE).await
    }

    /// Open (creating if needed) the database at `db_path` with `pool_size` connections
    #[instrument(skip(db_path))]
    pub async fn connect(db_path: &str, pool_size: u32) -> Result<Self> {
        info!("Initializing database at: {}", db_path);

        let database_url = format!("sqlite://{}", db_path);
        if !Sqlite::database_exists(&database_url)
            .await
            .unwrap_or(false)
        {
            info!("Creating database: {}", database_url);
            Sqlite::create_database(&database_url)
                .await
                .map_err(|e| Error::Database(format!("Failed to create database: {}", e)))?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
            .foreign_keys(true)
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "memory")
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size.max(1))
            .min_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::Database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };

        db.migrate().await?;

        info!("Database initialized successfully");
        Ok(db)
    }

    /// Run database migrations
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing database health check");

        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    /// Get row counts for every marketplace table
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DatabaseStats> {
        debug!("Gathering database statistics");

        let mut table_counts = std::collections::HashMap::new();

        for &table in ALLOWED_TABLES {
            if !is_safe_sql_identifier(table) {
                return Err(Error::Database(format!(
                    "ALLOWED_TABLES contains invalid SQL identifier: '{}'",
                    table
                )));
            }

            let query = format!("SELECT COUNT(*) as count FROM {}", table);
            let row = sqlx::query(&query)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(format!("Failed to get count for {}: {}", table, e))
                })?;

            let count: i64 = row.get("count");
            table_counts.insert(table.to_string(), count);
        }

        Ok(DatabaseStats { table_counts })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseStats {
    pub table_counts: std::collections::HashMap<String, i64>,
}

/// Page window shared by list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Zero-based page number and page size
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            offset: i64::from(page) * i64::from(page_size),
            limit: i64::from(page_size),
        }
    }
}

// Repository modules
pub mod repositories;

pub use repositories::{
    invoices::{Invoice, InvoiceRepository, NewInvoice},
    orders::{NewOrder, NewOrderItem, Order, OrderItem, OrderRepository, SellerEarning},
    payouts::{NewPayout, Payout, PayoutRepository},
    products::{CreateProductRequest, Product, ProductRepository, UpdateProductRequest},
    reviews::{CreateReviewRequest, Review, ReviewRepository, ReviewSummary},
    users::{CreateUserRequest, User, UserRepository},
};

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    /// Create a test database with a unique file name
    pub async fn create_test_db() -> Result<Db> {
        Db::new(&test_support::temp_db_path("pm_db")).await
    }

    /// Insert a user with the given role and return its id
    pub async fn seed_user(db: &Db, email: &str, role: &str) -> String {
        UserRepository::new(db.pool())
            .create(CreateUserRequest {
                username: email.split('@').next().unwrap_or(email).to_string(),
                email: email.to_string(),
                password_hash: "hashed_password".to_string(),
                role: role.to_string(),
            })
            .await
            .expect("Failed to seed user")
            .id
    }

    /// Insert a product for `seller_id` and return it
    pub async fn seed_product(db: &Db, seller_id: &str, title: &str, price_cents: i64) -> Product {
        ProductRepository::new(db.pool())
            .create(CreateProductRequest {
                seller_id: seller_id.to_string(),
                title: title.to_string(),
                description: None,
                price_cents,
                currency: "EUR".to_string(),
                file_url: format!("https://files.example.com/{}.pdf", title),
            })
            .await
            .expect("Failed to seed product")
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::create_test_db;
    use super::*;

    #[tokio::test]
    async fn test_database_initialization() {
        let db = create_test_db()
            .await
            .expect("Failed to create test database");

        db.health_check().await.expect("Health check should pass");

        let stats = db.stats().await.expect("Stats should be available");
        for &table in ALLOWED_TABLES {
            assert_eq!(stats.table_counts[table], 0, "{} should start empty", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = create_test_db()
            .await
            .expect("Failed to create test database");
        db.migrate().await.expect("Second migration run should be a no-op");
    }

    #[test]
    fn test_safe_sql_identifier_validation() {
        assert!(is_safe_sql_identifier("orders"));
        assert!(is_safe_sql_identifier("order_items"));
        assert!(is_safe_sql_identifier("_private"));

        assert!(!is_safe_sql_identifier(""));
        assert!(!is_safe_sql_identifier("1orders"));
        assert!(!is_safe_sql_identifier("orders; DROP TABLE users"));
        assert!(!is_safe_sql_identifier("orders--"));
        assert!(!is_safe_sql_identifier("order items"));
    }

    #[test]
    fn test_allowed_tables_are_safe() {
        for &table in ALLOWED_TABLES {
            assert!(is_safe_sql_identifier(table), "unsafe table name {}", table);
        }
    }

    #[test]
    fn test_page_request() {
        let page = PageRequest::new(2, 25);
        assert_eq!(page.offset, 50);
        assert_eq!(page.limit, 25);
    }
}
