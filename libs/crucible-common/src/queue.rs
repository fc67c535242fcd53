use crate::types::{ExecutionResult, QueuedSubmission};
use redis::{AsyncCommands, RedisResult};

/// Redis queue semantics - defines only semantics, not runtime logic.
/// Keeps producers and workers from drifting and makes every key
/// deterministic. The engine never touches Redis directly; this module is
/// the external queue's adapter surface.

pub const SUBMISSION_QUEUE: &str = "crucible:queue:submissions";
pub const RESULT_PREFIX: &str = "crucible:result";
pub const STATUS_PREFIX: &str = "crucible:status";

/// Terminal results are retained for 24 hours; persistence beyond the TTL is
/// not this system's job.
pub const RESULT_TTL_SECS: u64 = 86_400;

/// Generate result key for a submission
pub fn result_key(id: &uuid::Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, id)
}

/// Generate status key for a submission
pub fn status_key(id: &uuid::Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, id)
}

/// Push a submission onto the shared queue.
/// Uses RPUSH for FIFO semantics; also used to re-deliver retryable work.
pub async fn push_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &QueuedSubmission,
) -> RedisResult<()> {
    let payload = serde_json::to_string(submission).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
    })?;

    conn.rpush(SUBMISSION_QUEUE, payload).await
}

/// Pop a submission from the queue.
/// Uses BLPOP with a timeout so the worker can shut down gracefully.
pub async fn pop_submission(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<QueuedSubmission>> {
    let result: Option<(String, String)> = conn.blpop(SUBMISSION_QUEUE, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let submission: QueuedSubmission = serde_json::from_str(&payload).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(submission))
        }
        None => Ok(None),
    }
}

/// Store a terminal execution result, plus the status under its own key for
/// cheap polling. Both carry the result TTL.
pub async fn store_result(
    conn: &mut redis::aio::ConnectionManager,
    id: &uuid::Uuid,
    result: &ExecutionResult,
) -> RedisResult<()> {
    let key = result_key(id);
    let payload = serde_json::to_string(result).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
    })?;

    let _: () = conn.set_ex(&key, payload, RESULT_TTL_SECS).await?;

    let status_key_str = status_key(id);
    let status_str = serde_json::to_string(&result.status).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
    })?;
    let _: () = conn.set_ex(&status_key_str, status_str, RESULT_TTL_SECS).await?;

    Ok(())
}

/// Retrieve a stored execution result
pub async fn get_result(
    conn: &mut redis::aio::ConnectionManager,
    id: &uuid::Uuid,
) -> RedisResult<Option<ExecutionResult>> {
    let key = result_key(id);
    let payload: Option<String> = conn.get(&key).await?;

    match payload {
        Some(data) => {
            let result: ExecutionResult = serde_json::from_str(&data).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_result_key_deterministic() {
        let id = Uuid::new_v4();
        let key1 = result_key(&id);
        let key2 = result_key(&id);
        assert_eq!(key1, key2);
        assert!(key1.starts_with("crucible:result:"));
    }

    #[test]
    fn test_status_key_format() {
        let id = Uuid::new_v4();
        let key = status_key(&id);
        assert!(key.starts_with("crucible:status:"));
        assert!(key.contains(&id.to_string()));
    }
}
