// Handler tiers: public (no auth) and protected (JWT + tenant + principal).
pub mod extract;
pub mod protected;
pub mod public;

pub use extract::{ApiJson, ApiQuery};
