pub mod access_codes;
pub mod auth;
pub mod menu;
pub mod orders;
pub mod reports;
pub mod users;
