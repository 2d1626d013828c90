use std::collections::BTreeMap;

use diesel::prelude::*;

use crate::models::UserPreference;
use crate::schema::user_preferences;

/// Loads a user's preferences as a key/value map.
pub fn get_preferences(
    conn: &mut SqliteConnection,
    user_id: i32,
) -> Result<BTreeMap<String, String>, diesel::result::Error> {
    let rows = user_preferences::table
        .filter(user_preferences::user_id.eq(user_id))
        .load::<UserPreference>(conn)?;
    Ok(rows.into_iter().map(|p| (p.key, p.value)).collect())
}

/// Inserts or overwrites a single preference.
pub fn set_preference(
    conn: &mut SqliteConnection,
    user_id: i32,
    key: &str,
    value: &str,
) -> Result<usize, diesel::result::Error> {
    let row = UserPreference {
        user_id,
        key: key.to_string(),
        value: value.to_string(),
    };
    diesel::insert_into(user_preferences::table)
        .values(&row)
        .on_conflict((user_preferences::user_id, user_preferences::key))
        .do_update()
        .set(user_preferences::value.eq(value))
        .execute(conn)
}
