use crate::error::AppError;

pub const LOGIN_MAX_ATTEMPTS: u64 = 5;
pub const LOGIN_WINDOW_SECS: u64 = 900;

/// Checks an email-keyed rate limit stored in Redis.
///
/// Uses the INCR + EXPIRE strategy:
/// - Increments a counter for `key`
/// - On first increment, sets TTL to `window_secs`
/// - Returns 429 if counter exceeds `max_attempts`
///
/// An unreachable Redis never locks anyone out.
pub async fn check_rate_limit(
    redis: &mut redis::aio::MultiplexedConnection,
    key: &str,
    max_attempts: u64,
    window_secs: u64,
) -> Result<(), AppError> {
    let count: u64 = redis::cmd("INCR")
        .arg(key)
        .query_async(redis)
        .await
        .unwrap_or(0);

    if count == 1 {
        // Set TTL only on first increment to avoid resetting the window on each attempt
        let _: Result<(), _> = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(redis)
            .await;
    }

    if count > max_attempts {
        tracing::warn!(key, count, "rate limit exceeded");
        return Err(AppError::TooManyRequests(
            "Too many attempts. Try again in a few minutes.".into(),
        ));
    }

    Ok(())
}

/// Redis key for an email-scoped limit, e.g. `rate:login:ann@x.test`.
pub fn email_key(action: &str, email: &str) -> String {
    format!("rate:{action}:{}", email.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_ignore_case_and_padding() {
        assert_eq!(email_key("login", " Ann@X.test "), "rate:login:ann@x.test");
    }
}
