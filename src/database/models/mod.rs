pub mod attachment;
pub mod document;
pub mod expense;
pub mod role;
pub mod table;
pub mod tag;
pub mod tenant;
pub mod workspace;
