//! Company endpoints.

use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::auth::{AuthContext, AuthError, service};
use crate::logged_json::LoggedJson;
use crate::models::{Company, Location};
use crate::orm::company::{get_company_by_id, get_company_locations};
use crate::orm::{DbConn, run_store};
use crate::session_guards::{AccessRequirements, AuthenticatedUser};

#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct CreateCompanyRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompanyView {
    #[serde(flatten)]
    pub company: Company,
    pub locations: Vec<Location>,
}

/// Create Company endpoint.
///
/// - **URL:** `/api/v1/companies`
/// - **Method:** `POST`
/// - **Authentication:** Access token of a user without a company
///
/// The caller becomes the company's administrator. Refresh the access token
/// afterwards to obtain claims for the new company.
#[post("/companies", data = "<request>")]
pub async fn create_company(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: AuthenticatedUser,
    request: LoggedJson<CreateCompanyRequest>,
) -> Result<status::Created<Json<Company>>, AuthError> {
    let company = service::create_company(&db, ctx, user.user_id(), &request.name).await?;
    let location = format!("/api/v1/companies/{}", company.id);
    Ok(status::Created::new(location).body(Json(company)))
}

/// Get Company endpoint.
///
/// - **URL:** `/api/v1/companies/<company_id>`
/// - **Method:** `GET`
/// - **Authorization:** Caller must belong to `company_id`; any other id is 403
#[get("/companies/<company_id>")]
pub async fn get_company(
    db: DbConn,
    ctx: &State<AuthContext>,
    user: AuthenticatedUser,
    company_id: i32,
) -> Result<Json<CompanyView>, AuthError> {
    AccessRequirements::new()
        .company(company_id)
        .enforce(&db, ctx, &user)
        .await?;

    let (company, locations) = run_store(&db, ctx.config.store_timeout(), move |conn| {
        let company = get_company_by_id(conn, company_id)?;
        let locations = get_company_locations(conn, company_id)?;
        Ok::<_, diesel::result::Error>((company, locations))
    })
    .await?;

    let company = company.ok_or_else(|| AuthError::not_found("Company"))?;
    Ok(Json(CompanyView { company, locations }))
}

pub fn routes() -> Vec<Route> {
    routes![create_company, get_company]
}
