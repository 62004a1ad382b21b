pub mod balance;
pub mod schema;
