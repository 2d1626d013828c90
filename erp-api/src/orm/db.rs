use std::time::Duration;

use diesel::QueryableByName;
use diesel::connection::SimpleConnection;
use diesel::sql_types::BigInt;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use rocket::fairing::AdHoc;
use rocket::tokio::time::timeout;
use rocket_sync_db_pools::{database, diesel};

use crate::auth::AuthError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[database("sqlite_db")]
pub struct DbConn(diesel::SqliteConnection);

/// Trait for abstracting database operations to support both production and testing.
///
/// This trait allows the same functions to work with both `DbConn` (production)
/// and `FakeDbConn` (testing) by providing a unified interface for database operations.
pub trait DbRunner {
    /// Executes a database operation with a connection.
    fn run<F, R>(&self, f: F) -> impl std::future::Future<Output = R> + Send
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> R + Send + 'static,
        R: Send + 'static;
}

impl DbRunner for DbConn {
    fn run<F, R>(&self, f: F) -> impl std::future::Future<Output = R> + Send
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> R + Send + 'static,
        R: Send + 'static,
    {
        DbConn::run(self, f)
    }
}

/// Runs `f` on a pooled connection, giving up after `limit`.
///
/// The connection is prepared first: foreign keys on, and SQLite's busy
/// timeout set to the same limit so lock waits cannot outlast the call.
/// A call that runs out of time reports `Unavailable`; the blocking work
/// itself cannot be cancelled and finishes in the background.
pub async fn run_store<D, F, R, E>(db: &D, limit: Duration, f: F) -> Result<R, AuthError>
where
    D: DbRunner,
    F: FnOnce(&mut diesel::SqliteConnection) -> Result<R, E> + Send + 'static,
    R: Send + 'static,
    E: Into<AuthError> + Send + 'static,
{
    let busy_ms = limit.as_millis();
    let work = db.run(move |conn| -> Result<R, AuthError> {
        prepare_connection(conn, busy_ms)?;
        f(conn).map_err(Into::into)
    });

    match timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Store call exceeded {} ms", busy_ms);
            Err(AuthError::Unavailable)
        }
    }
}

/// Per-connection PRAGMAs. SQLite keeps these per handle, so they are
/// applied on every checkout rather than once at startup.
pub fn prepare_connection(
    conn: &mut diesel::SqliteConnection,
    busy_timeout_ms: u128,
) -> Result<(), diesel::result::Error> {
    conn.batch_execute(&format!(
        "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
        busy_timeout_ms
    ))
}

#[derive(QueryableByName)]
struct LastInsertRowId {
    #[diesel(sql_type = BigInt)]
    last_insert_rowid: i64,
}

/// Row id of the last INSERT made on this connection.
pub fn last_insert_rowid(conn: &mut diesel::SqliteConnection) -> Result<i32, diesel::result::Error> {
    use diesel::RunQueryDsl;

    let row = diesel::sql_query("SELECT last_insert_rowid() as last_insert_rowid")
        .get_result::<LastInsertRowId>(conn)?;
    Ok(row.last_insert_rowid as i32)
}

/// Runs all pending database migrations on the provided connection.
///
/// # Arguments
/// * `conn` - A mutable reference to a SQLite database connection
///
/// # Returns
/// The versions that were applied, or a description of the failure
pub fn run_pending_migrations(conn: &mut diesel::SqliteConnection) -> Result<usize, String> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|applied| applied.len())
        .map_err(|e| e.to_string())
}

/// Creates a Rocket fairing that prepares the database on ignition.
///
/// Switches the file to WAL journaling so readers are not blocked by the
/// session registry's write transactions, then applies pending Diesel
/// migrations. Ignition fails if either step fails.
pub fn run_migrations_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Diesel Migrations", |rocket| async {
        let conn = match DbConn::get_one(&rocket).await {
            Some(conn) => conn,
            None => {
                error!("[migrations] ERROR: Could not get DB connection.");
                return Err(rocket);
            }
        };

        let outcome = conn
            .run(|c| {
                c.batch_execute("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
                    .map_err(|e| e.to_string())?;
                run_pending_migrations(c)
            })
            .await;

        match outcome {
            Ok(applied) => {
                info!("[migrations] {} migration(s) applied", applied);
                Ok(rocket)
            }
            Err(e) => {
                error!("[migrations] ERROR: {}", e);
                Err(rocket)
            }
        }
    })
}
