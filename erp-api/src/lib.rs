#[macro_use]
extern crate rocket;

use std::sync::Arc;

use rocket::figment::value::Map;
use rocket::figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use rocket::http::Status;
use rocket::request::Request;
use rocket::serde::json::{Json, Value};
use rocket::{Build, Rocket};

pub mod admin_init_fairing;
pub mod api;
pub mod auth;
pub mod logged_json;
pub mod models;
pub mod orm;
pub use orm::DbConn;
pub mod schema;
pub mod session_guards;

#[cfg(test)]
pub mod generate_types;

use auth::{AuthError, ErrorResponse, LogNotifier, ResetNotifier, auth_context_fairing};
use session_guards::GuardFailure;

/// Error body for a request that never reached a handler.
///
/// A failing auth guard leaves its [`AuthError`] behind, so the body carries
/// the same `code` the handler would have returned. Other failures (unknown
/// route, malformed JSON) are described by their HTTP status alone.
fn catcher_body(status: Status, req: &Request) -> Json<ErrorResponse> {
    if let Some(err) = &req.local_cache(|| GuardFailure(None)).0 {
        return Json(err.to_response());
    }

    let code = match status.code {
        400 => "bad_request",
        401 => AuthError::TokenExpiredOrInvalid.code(),
        403 => "forbidden",
        404 => "not_found",
        422 => "unprocessable_entity",
        503 => AuthError::Unavailable.code(),
        _ if status.code >= 500 => AuthError::Internal.code(),
        _ => "error",
    };
    Json(ErrorResponse {
        error: status.reason().unwrap_or("Unknown Error").to_string(),
        code: code.to_string(),
    })
}

#[catch(400)]
fn bad_request(req: &Request) -> Json<ErrorResponse> {
    catcher_body(Status::BadRequest, req)
}

#[catch(401)]
fn unauthorized(req: &Request) -> Json<ErrorResponse> {
    catcher_body(Status::Unauthorized, req)
}

#[catch(403)]
fn forbidden(req: &Request) -> Json<ErrorResponse> {
    catcher_body(Status::Forbidden, req)
}

#[catch(404)]
fn not_found(req: &Request) -> Json<ErrorResponse> {
    catcher_body(Status::NotFound, req)
}

#[catch(422)]
fn unprocessable_entity(req: &Request) -> Json<ErrorResponse> {
    catcher_body(Status::UnprocessableEntity, req)
}

#[catch(429)]
fn too_many_requests(req: &Request) -> Json<ErrorResponse> {
    catcher_body(Status::TooManyRequests, req)
}

#[catch(500)]
fn internal_server_error(req: &Request) -> Json<ErrorResponse> {
    catcher_body(Status::InternalServerError, req)
}

#[catch(503)]
fn service_unavailable(req: &Request) -> Json<ErrorResponse> {
    catcher_body(Status::ServiceUnavailable, req)
}

#[catch(default)]
fn default_catcher(status: Status, req: &Request) -> Json<ErrorResponse> {
    catcher_body(status, req)
}

pub fn mount_api_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/api/v1", api::routes())
}

fn log_rocket_info(rocket: &Rocket<Build>) {
    let figment = rocket.figment();

    if let Ok(address) = figment.extract_inner::<String>("address") {
        info!("Rocket is running at: {}", address);
    }

    if let Ok(port) = figment.extract_inner::<u16>("port") {
        info!("Rocket is listening on port: {}", port);
    }

    match figment.extract_inner::<Map<String, Value>>("databases.sqlite_db") {
        Ok(db_config) => {
            if let Some(Value::String(url)) = db_config.get("url") {
                info!("Database URL: {}", url);
            } else {
                warn!("Database URL not found in configuration");
            }
        }
        Err(e) => {
            warn!("Failed to extract database configuration: {}", e);
        }
    }

    if !figment.contains("auth.jwt_secret") {
        warn!("auth.jwt_secret is not configured; ignition will fail");
    }
}

/// Assembles the server from a configuration.
///
/// Fairing order matters: the pool must exist before migrations run, and
/// the schema must exist before the administrator is seeded.
pub fn build_rocket(figment: Figment, notifier: Arc<dyn ResetNotifier>) -> Rocket<Build> {
    let rocket = rocket::custom(figment)
        .attach(DbConn::fairing())
        .attach(orm::run_migrations_fairing())
        .attach(admin_init_fairing::admin_init_fairing())
        .attach(auth_context_fairing(notifier))
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable_entity,
                too_many_requests,
                internal_server_error,
                service_unavailable,
                default_catcher
            ],
        );

    mount_api_routes(rocket)
}

/// Production configuration: Rocket.toml and `ROCKET_*` variables, plus
/// `DATABASE_URL` and `JWT_SECRET` from the environment or `.env`.
///
/// Note that this function doesn't get tested by our tests. Tests build
/// their server with [`build_rocket`] and a temporary database.
pub fn rocket() -> Rocket<Build> {
    dotenvy::dotenv().ok();

    let mut figment = Figment::from(rocket::Config::default())
        .merge(Toml::file("Rocket.toml").nested())
        .merge(Env::prefixed("ROCKET_").global());

    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        figment = figment.merge(("databases.sqlite_db.url", database_url));
    }
    if let Ok(secret) = std::env::var("JWT_SECRET") {
        figment = figment.merge(("auth.jwt_secret", secret));
    }

    let rocket = build_rocket(figment, Arc::new(LogNotifier));
    log_rocket_info(&rocket);
    rocket
}
