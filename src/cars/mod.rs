pub mod cars;
pub mod emi;
pub mod listing;
pub mod query;
pub mod saved;
