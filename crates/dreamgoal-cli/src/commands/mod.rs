pub mod config;
pub mod dream;
pub mod goal;
pub mod score;
pub mod week;
