// Protected handlers (/api/v1/*). Every route runs behind the JWT, tenant
// and principal middleware and checks one permission before calling a service.
pub mod attachment;
pub mod catalog;
pub mod document;
pub mod expense;
pub mod me;
pub mod report;
pub mod role;
pub mod table;
pub mod tag;
pub mod workspace;
