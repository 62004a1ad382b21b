pub mod attachments;
pub mod catalog;
pub mod ledger;
pub mod server;
pub mod token;
