pub mod auth;
pub mod booking;
pub mod customer;
pub mod health;
pub mod payment;
pub mod quote;
pub mod subscription;
