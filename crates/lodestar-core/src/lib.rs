pub mod models;
pub mod password;
pub mod token;
pub mod validation;
