pub mod company;
pub mod company_setting;
pub mod device_session;
pub mod password_reset;
pub mod role;
pub mod user;
pub mod user_preference;

// Re-export models for easier access
pub use company::*;
pub use company_setting::*;
pub use device_session::*;
pub use password_reset::*;
pub use role::*;
pub use user::*;
pub use user_preference::*;
