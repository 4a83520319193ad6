pub mod db;
pub mod price_api;
pub mod render;
pub mod telegram;
