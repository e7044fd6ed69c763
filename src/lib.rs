pub mod api;
pub mod config;
pub mod db;
pub mod economy;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod scheduler;
