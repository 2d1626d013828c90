//! Test fixtures shared by unit and integration tests.
//!
//! Compiled in every build so that integration tests under `tests/` can
//! reach it without feature flags. Nothing here is mounted or attached by
//! the production `rocket()` builder.

use std::sync::{Arc, Mutex};

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use rocket::figment::{
    Figment,
    util::map,
    value::{Map, Value},
};
use rocket::{Build, Rocket, fairing::AdHoc};
use uuid::Uuid;

use super::db::{DbConn, DbRunner, prepare_connection, run_pending_migrations};
use crate::auth::{RecordingNotifier, ResetNotifier};
use crate::models::{NewRole, Role, User, UserInput};
use crate::orm::company::{get_company_by_name, insert_company, insert_location};
use crate::orm::credentials::hash_password;
use crate::orm::permission::replace_role_permissions;
use crate::orm::role::{get_role_by_name, insert_role};
use crate::orm::user::insert_user;
use crate::schema::users;

/// Signing secret used by every test Rocket.
pub const TEST_JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";
/// Password shared by all seeded users.
pub const TEST_PASSWORD: &str = "correct-horse-1";

pub const ACME: &str = "Acme Retail";
pub const GLOBEX: &str = "Globex";

/// Seeded users as `(username, company, role)`.
pub const SEEDED_USERS: &[(&str, Option<&str>, Option<&str>)] = &[
    ("acme_admin", Some(ACME), Some("Admin")),
    ("acme_manager", Some(ACME), Some("Manager")),
    ("acme_cashier", Some(ACME), Some("Cashier")),
    ("globex_admin", Some(GLOBEX), Some("Admin")),
    ("newbie", None, None),
    ("locked_user", Some(ACME), Some("Cashier")),
];

/// Email of a seeded user.
pub fn seeded_email(username: &str) -> String {
    format!("{}@example.test", username)
}

/// A fresh path in the temp directory for a file-backed test database.
pub fn temp_db_path() -> String {
    std::env::temp_dir()
        .join(format!("erp_test_{}.sqlite", Uuid::new_v4()))
        .display()
        .to_string()
}

/// In-memory database with all migrations applied and foreign keys on.
///
/// Each call returns a new, independent database.
pub fn setup_test_db() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:")
        .expect("Failed to create in-memory SQLite database");
    prepare_connection(&mut conn, 5_000).expect("Failed to prepare connection");
    run_pending_migrations(&mut conn).expect("Failed to run migrations");
    conn
}

/// File-backed database at `path`, migrated and in WAL mode.
///
/// Used when several connections must share one database, e.g. to race
/// logins from different threads.
pub fn setup_test_db_at(path: &str) -> SqliteConnection {
    let mut conn =
        SqliteConnection::establish(path).expect("Failed to create file SQLite database");
    conn.batch_execute("PRAGMA journal_mode = WAL;")
        .expect("Failed to enable WAL");
    prepare_connection(&mut conn, 5_000).expect("Failed to prepare connection");
    run_pending_migrations(&mut conn).expect("Failed to run migrations");
    conn
}

/// Async-compatible wrapper around a single test connection.
///
/// Implements [`DbRunner`] so code written against `DbConn` can be driven
/// from unit tests without a Rocket instance.
#[derive(Clone)]
pub struct FakeDbConn(pub Arc<Mutex<SqliteConnection>>);

impl DbRunner for FakeDbConn {
    fn run<F, R>(&self, f: F) -> impl std::future::Future<Output = R> + Send
    where
        F: FnOnce(&mut SqliteConnection) -> R + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.0.clone();
        async move {
            // Off the async thread, like the pool, so callers' timeouts can fire.
            rocket::tokio::task::spawn_blocking(move || {
                let mut guard = conn.lock().expect("test connection poisoned");
                f(&mut guard)
            })
            .await
            .expect("test connection task panicked")
        }
    }
}

/// Wraps `conn` (typically from [`setup_test_db`]) in a [`FakeDbConn`].
pub fn setup_test_dbconn(conn: SqliteConnection) -> FakeDbConn {
    FakeDbConn(Arc::new(Mutex::new(conn)))
}

/// Creates the standard tenants, roles and users all tests rely on.
///
/// Every seeded user has the password [`TEST_PASSWORD`]. Acme caps
/// nothing; tests set session limits themselves.
pub fn seed_test_data(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    let acme = insert_company(conn, ACME)?;
    let globex = insert_company(conn, GLOBEX)?;
    let acme_hq = insert_location(conn, acme.id, "Acme HQ")?;
    insert_location(conn, acme.id, "Acme Store 1")?;
    let globex_hq = insert_location(conn, globex.id, "Globex HQ")?;

    let manager = ensure_role(conn, "Manager", "Store manager")?;
    replace_role_permissions(
        conn,
        manager.id,
        &[
            "VIEW_DASHBOARD".to_string(),
            "VIEW_SALES".to_string(),
            "VIEW_USERS".to_string(),
            "VIEW_SESSIONS".to_string(),
            "VIEW_SETTINGS".to_string(),
        ],
    )?
    .map_err(|_| diesel::result::Error::NotFound)?;

    let cashier = ensure_role(conn, "Cashier", "Point of sale")?;
    replace_role_permissions(conn, cashier.id, &["CREATE_SALES".to_string()])?
        .map_err(|_| diesel::result::Error::NotFound)?;

    // One hash for everybody; Argon2 is slow in debug builds.
    let password_hash = hash_password(TEST_PASSWORD).expect("hashing test password");

    for (username, company, role) in SEEDED_USERS {
        let company_id = match company {
            Some(name) => get_company_by_name(conn, name)?.map(|c| c.id),
            None => None,
        };
        let location_id = match company_id {
            Some(id) if id == acme.id => Some(acme_hq.id),
            Some(id) if id == globex.id => Some(globex_hq.id),
            _ => None,
        };
        let role_id = match role {
            Some(name) => get_role_by_name(conn, name)?.map(|r| r.id),
            None => None,
        };

        let user = insert_user(
            conn,
            UserInput {
                username: username.to_string(),
                email: seeded_email(username),
                password_hash: password_hash.clone(),
                first_name: Some(username.to_string()),
                last_name: None,
                company_id,
                location_id,
                role_id,
            },
        )?;

        if *username == "locked_user" {
            diesel::update(users::table.find(user.id))
                .set(users::is_locked.eq(true))
                .execute(conn)?;
        }
    }

    Ok(())
}

/// Looks up a seeded user by username.
pub fn seeded_user(conn: &mut SqliteConnection, username: &str) -> User {
    users::table
        .filter(users::username.eq(username))
        .first::<User>(conn)
        .expect("seeded user")
}

fn ensure_role(
    conn: &mut SqliteConnection,
    role_name: &str,
    description: &str,
) -> Result<Role, diesel::result::Error> {
    match get_role_by_name(conn, role_name)? {
        Some(role) => Ok(role),
        None => insert_role(
            conn,
            NewRole {
                name: role_name.to_string(),
                description: Some(description.to_string()),
                is_system_role: false,
                grants_all_permissions: false,
            },
        ),
    }
}

fn test_data_init_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Test Data Initialization", |rocket| async {
        let conn = match DbConn::get_one(&rocket).await {
            Some(conn) => conn,
            None => return Err(rocket),
        };

        match conn.run(seed_test_data).await {
            Ok(()) => Ok(rocket),
            Err(e) => {
                error!("[test-data-init] ERROR: Failed to create test data: {:?}", e);
                Err(rocket)
            }
        }
    })
}

/// Figment for a test instance backed by the database file at `db_path`.
pub fn test_figment(db_path: &str) -> Figment {
    let db_config: Map<_, Value> = map! {
        "url" => db_path.into(),
        "pool_size" => 8.into(),
        "timeout" => 5.into(),
    };

    rocket::Config::figment()
        .merge(("databases", map!["sqlite_db" => db_config]))
        .merge(("auth.jwt_secret", TEST_JWT_SECRET))
}

/// A complete application over a fresh seeded database.
pub fn test_rocket() -> Rocket<Build> {
    test_rocket_with_notifier(Arc::new(RecordingNotifier::default()))
}

/// A complete application over `figment`, usually [`test_figment`] with
/// overrides merged on top. The database named there is seeded on ignition.
pub fn test_rocket_from(figment: Figment) -> Rocket<Build> {
    let notifier: Arc<dyn ResetNotifier> = Arc::new(RecordingNotifier::default());
    crate::build_rocket(figment, notifier).attach(test_data_init_fairing())
}

/// Like [`test_rocket`] but hands reset secrets to `notifier`, so tests can
/// read back what a user would have received by email.
pub fn test_rocket_with_notifier(notifier: Arc<RecordingNotifier>) -> Rocket<Build> {
    let notifier: Arc<dyn ResetNotifier> = notifier;
    crate::build_rocket(test_figment(&temp_db_path()), notifier).attach(test_data_init_fairing())
}
