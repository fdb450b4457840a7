pub mod identity;
pub mod stripe;
