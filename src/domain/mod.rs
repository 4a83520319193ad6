pub mod alerts;
pub mod clock;
pub mod command;
pub mod models;
pub mod pricing;
pub mod session_cost;
pub mod summary;
