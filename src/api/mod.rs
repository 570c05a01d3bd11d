pub mod login;
pub mod v1;
