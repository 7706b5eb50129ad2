pub mod config;
pub mod db;
pub mod engine;
pub mod integrations;
pub mod models;
pub mod route;
pub mod routemount;
pub mod state;
pub mod utils;
