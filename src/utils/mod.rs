pub mod errorhandler;
pub mod format;
pub mod jwt;
pub mod pagination;
pub mod password;
pub mod ratelimit;
pub mod validate;
pub mod sql;
