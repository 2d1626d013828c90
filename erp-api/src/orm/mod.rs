pub mod company;
pub mod company_setting;
pub mod credentials;
mod db;
pub mod device_session;
pub mod password_reset;
pub mod permission;
pub mod role;
pub mod testing;
pub mod user;
pub mod user_preference;

pub use db::*;
