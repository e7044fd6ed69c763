pub mod arena;
pub mod boss_arena;
pub mod catalog;
pub mod combat;
pub mod config;
pub mod duel;
pub mod effectiveness;
pub mod host;
pub mod knockout;
pub mod server;
pub mod spawn;
pub mod stats;
pub mod taming;
