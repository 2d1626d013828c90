use chrono::NaiveDateTime;
use diesel::{Identifiable, Insertable, Queryable};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::schema::{companies, locations};

#[derive(Queryable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[diesel(table_name = companies)]
#[ts(export)]
pub struct Company {
    pub id: i32,
    pub name: String,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub name: String,
}

/// A sub-tenant of a company (a shop, warehouse or branch).
#[derive(Queryable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[diesel(table_name = locations)]
#[ts(export)]
pub struct Location {
    pub id: i32,
    pub company_id: i32,
    pub name: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = locations)]
pub struct NewLocation {
    pub company_id: i32,
    pub name: String,
}
