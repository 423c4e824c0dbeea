use std::future::Future;

/// Bounded retry over a single Docker call. On a transport-level error (no
/// HTTP status at all — connection reset, timeout, decode failure) or a
/// 5xx-class daemon response, the call is retried up to `retries` times with
/// no backoff. A 4xx-class response fails immediately. The retry count is a
/// parameter of the call site, not a gateway-wide setting, so composite
/// operations (e.g. a birth) can choose their own tolerance per step.
pub async fn with_retry<F, Fut, T>(retries: u32, mut f: F) -> Result<T, bollard::errors::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, bollard::errors::Error>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < retries && is_retryable(&e) => {
                attempt += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_retryable(err: &bollard::errors::Error) -> bool {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            *status_code >= 500
        }
        // Anything without a daemon-issued status code is a transport error.
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, bollard::errors::Error> = with_retry(2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_5xx_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, bollard::errors::Error> = with_retry(1, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(bollard::errors::Error::DockerResponseServerError {
                        status_code: 503,
                        message: "unavailable".into(),
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_on_4xx() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, bollard::errors::Error> = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404,
                    message: "not found".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
