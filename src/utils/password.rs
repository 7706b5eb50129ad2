use tracing::warn;

use crate::utils::errorhandler::AppError;

const BCRYPT_COST: u32 = 12;

// bcrypt is CPU bound at this cost, keep it off the async workers
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| {
            warn!("password hashing task failed: {}", e);
            AppError::Unexpected
        })?
        .map_err(|e| {
            warn!("password hashing failed: {}", e);
            AppError::Unexpected
        })
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| {
            warn!("password verify task failed: {}", e);
            AppError::Unexpected
        })?
        .map_err(|_| AppError::unauthorized("Invalid email or password"))
}
