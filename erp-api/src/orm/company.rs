use diesel::prelude::*;

use crate::models::{Company, Location, NewCompany, NewLocation};
use crate::orm::db::last_insert_rowid;
use crate::schema::{companies, locations};

/// Try to find a company by name (case-sensitive).
/// Returns Ok(Some(Company)) if found, Ok(None) if not, Err on DB error.
pub fn get_company_by_name(
    conn: &mut SqliteConnection,
    company_name: &str,
) -> Result<Option<Company>, diesel::result::Error> {
    companies::table
        .filter(companies::name.eq(company_name))
        .first::<Company>(conn)
        .optional()
}

/// Try to find a company by id.
/// Returns Ok(Some(Company)) if found, Ok(None) if not, Err on DB error.
pub fn get_company_by_id(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<Option<Company>, diesel::result::Error> {
    companies::table
        .filter(companies::id.eq(company_id))
        .first::<Company>(conn)
        .optional()
}

/// Insert a new company. Names are unique.
pub fn insert_company(
    conn: &mut SqliteConnection,
    company_name: &str,
) -> Result<Company, diesel::result::Error> {
    let new_comp = NewCompany {
        name: company_name.trim().to_string(),
    };

    diesel::insert_into(companies::table)
        .values(&new_comp)
        .execute(conn)?;

    let last_id = last_insert_rowid(conn)?;
    companies::table
        .filter(companies::id.eq(last_id))
        .first::<Company>(conn)
}

pub fn insert_location(
    conn: &mut SqliteConnection,
    company_id: i32,
    location_name: &str,
) -> Result<Location, diesel::result::Error> {
    diesel::insert_into(locations::table)
        .values(&NewLocation {
            company_id,
            name: location_name.trim().to_string(),
        })
        .execute(conn)?;

    let last_id = last_insert_rowid(conn)?;
    locations::table
        .filter(locations::id.eq(last_id))
        .first::<Location>(conn)
}

pub fn get_location(
    conn: &mut SqliteConnection,
    location_id: i32,
) -> Result<Option<Location>, diesel::result::Error> {
    locations::table
        .filter(locations::id.eq(location_id))
        .first::<Location>(conn)
        .optional()
}

/// Locations of a company in ascending id order.
pub fn get_company_locations(
    conn: &mut SqliteConnection,
    company_id: i32,
) -> Result<Vec<Location>, diesel::result::Error> {
    locations::table
        .filter(locations::company_id.eq(company_id))
        .order(locations::id.asc())
        .load::<Location>(conn)
}
