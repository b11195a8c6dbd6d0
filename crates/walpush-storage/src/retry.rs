use std::fmt;
use std::io::{self, ErrorKind};
use std::time::Duration;

use tracing::warn;

use crate::{RetryConfig, StorageError};

/// Retry an idempotent storage call with exponential backoff + jitter.
///
/// Uploads never go through here: their bodies are single-pass streams.
pub fn retry_storage<T>(
    config: &RetryConfig,
    op_name: &str,
    f: impl Fn() -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    retry_with_backoff(config, op_name, is_transient_storage, f)
}

/// Backoff loop: the wait doubles after every failed attempt, up to
/// `retry_max_delay_ms`, with up to one extra delay of random jitter.
pub fn retry_with_backoff<T, E: fmt::Display>(
    config: &RetryConfig,
    op_name: &str,
    is_transient: impl Fn(&E) -> bool,
    f: impl Fn() -> Result<T, E>,
) -> Result<T, E> {
    let mut wait_ms = config.retry_delay_ms;
    let mut attempt = 0;
    loop {
        let err = match f() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= config.max_retries || !is_transient(&err) {
            return Err(err);
        }
        warn!(
            op = op_name,
            attempt = attempt + 1,
            max_retries = config.max_retries,
            error = %err,
            "transient storage error, retrying"
        );
        let jitter = rand::random::<u64>() % wait_ms.max(1);
        std::thread::sleep(Duration::from_millis(wait_ms + jitter));
        wait_ms = wait_ms.saturating_mul(2).min(config.retry_max_delay_ms);
        attempt += 1;
    }
}

/// Network-flavoured I/O failures that may succeed on a second try.
pub fn is_transient_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted
    )
}

/// Only I/O failures are retried; rejected requests and bad keys are final.
pub fn is_transient_storage(err: &StorageError) -> bool {
    match err {
        StorageError::Io(e) => is_transient_io(e),
        StorageError::Multipart { .. } | StorageError::SingleShot(_) | StorageError::InvalidKey(_) => {
            false
        }
    }
}
