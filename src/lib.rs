pub mod config;
pub mod errors;
pub mod funding;
pub mod ledger;
pub mod metadata;
pub mod progress;
pub mod retry;
pub mod store;
pub mod swap;
pub mod trade;
pub mod wallet;
