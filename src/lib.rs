pub mod api;
pub mod clock;
pub mod config;
pub mod departure;
pub mod error;
pub mod estimation;
pub mod features;
pub mod geo;
pub mod prediction;
pub mod ranking;
pub mod state;
pub mod store;
