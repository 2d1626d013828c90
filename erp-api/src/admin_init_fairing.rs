use diesel::prelude::*;
use dotenvy::dotenv;
use rocket::Rocket;
use rocket::fairing::AdHoc;

use crate::auth::ADMIN_ROLE;
use crate::models::{Company, Role, User, UserInput};
use crate::orm::DbConn;
use crate::orm::company::{get_company_by_name, insert_company};
use crate::orm::credentials::{LoginIdentifier, find_user_by_identifier, hash_password};
use crate::orm::role::get_role_by_name;
use crate::orm::user::insert_user;

/// Where the bootstrap administrator comes from.
struct AdminSeed {
    company: String,
    username: String,
    email: String,
    password: String,
}

impl AdminSeed {
    /// Reads ERP_DEFAULT_COMPANY, ERP_DEFAULT_USERNAME, ERP_DEFAULT_EMAIL and
    /// ERP_DEFAULT_PASSWORD, falling back to development defaults.
    fn from_env() -> Self {
        let var = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
        AdminSeed {
            company: var("ERP_DEFAULT_COMPANY", "Default Company"),
            username: var("ERP_DEFAULT_USERNAME", "admin"),
            email: var("ERP_DEFAULT_EMAIL", "admin@example.com"),
            password: var("ERP_DEFAULT_PASSWORD", "admin123"),
        }
    }
}

/// Add default company and administrator if needed.
///
/// The administrator holds the seeded "Admin" role. Nothing is changed when
/// a user with the configured username or email already exists.
pub fn admin_init_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Admin User Initialization", |rocket| async {
        dotenv().ok();

        let conn = match get_db_connection(&rocket).await {
            Some(conn) => conn,
            None => return Err(rocket),
        };

        let seed = AdminSeed::from_env();
        match conn.run(move |c| create_admin_if_needed(c, &seed)).await {
            Ok(()) => Ok(rocket),
            Err(e) => {
                error!("[admin-init] FATAL: Admin user creation failed: {:?}", e);
                Err(rocket)
            }
        }
    })
}

async fn get_db_connection(rocket: &Rocket<rocket::Build>) -> Option<DbConn> {
    match DbConn::get_one(rocket).await {
        Some(conn) => Some(conn),
        None => {
            error!("[admin-init] ERROR: Could not get DB connection.");
            None
        }
    }
}

fn create_admin_if_needed(
    c: &mut SqliteConnection,
    seed: &AdminSeed,
) -> Result<(), diesel::result::Error> {
    if admin_user_exists(c, seed)? {
        info!("[admin-init] Admin user '{}' already exists", seed.username);
        return Ok(());
    }

    let role = admin_role(c)?;
    let company = find_or_create_company(c, &seed.company)?;
    create_admin_user(c, seed, &company, &role)?;
    Ok(())
}

fn admin_user_exists(
    c: &mut SqliteConnection,
    seed: &AdminSeed,
) -> Result<bool, diesel::result::Error> {
    let by_name = LoginIdentifier::Username(seed.username.clone());
    let by_email = LoginIdentifier::Email(seed.email.clone());
    Ok(find_user_by_identifier(c, &by_name)?.is_some()
        || find_user_by_identifier(c, &by_email)?.is_some())
}

fn admin_role(c: &mut SqliteConnection) -> Result<Role, diesel::result::Error> {
    match get_role_by_name(c, ADMIN_ROLE)? {
        Some(role) => Ok(role),
        None => {
            error!("[admin-init] ERROR: role '{}' missing; migrations incomplete?", ADMIN_ROLE);
            Err(diesel::result::Error::NotFound)
        }
    }
}

fn find_or_create_company(
    c: &mut SqliteConnection,
    company_name: &str,
) -> Result<Company, diesel::result::Error> {
    if let Some(found) = get_company_by_name(c, company_name)? {
        info!("[admin-init] Matched company: '{}'", company_name);
        return Ok(found);
    }

    info!("[admin-init] No matching company found. Creating '{}'.", company_name);
    insert_company(c, company_name).inspect_err(|e| {
        error!("[admin-init] ERROR creating company: {:?}", e);
    })
}

fn create_admin_user(
    c: &mut SqliteConnection,
    seed: &AdminSeed,
    company: &Company,
    role: &Role,
) -> Result<User, diesel::result::Error> {
    let password_hash = hash_password(&seed.password).map_err(|e| {
        error!("[admin-init] ERROR hashing admin password: {}", e);
        diesel::result::Error::RollbackTransaction
    })?;

    let admin_user = UserInput {
        username: seed.username.clone(),
        email: seed.email.clone(),
        password_hash,
        first_name: Some("Administrator".to_string()),
        last_name: None,
        company_id: Some(company.id),
        location_id: None,
        role_id: Some(role.id),
    };

    match insert_user(c, admin_user) {
        Ok(user) => {
            info!(
                "[admin-init] Created admin user '{}' in company '{}'",
                seed.username, company.name
            );
            Ok(user)
        }
        Err(e) => {
            error!("[admin-init] ERROR creating admin user: {:?}", e);
            Err(e)
        }
    }
}
