pub mod booking;
pub mod customer;
pub mod payment;
pub mod quote;
pub mod user;
