use diesel::{Insertable, Queryable};

use crate::schema::user_preferences;

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = user_preferences)]
pub struct UserPreference {
    pub user_id: i32,
    pub key: String,
    pub value: String,
}
