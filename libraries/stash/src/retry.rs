use std::{fmt::Display, time::Duration};

use futures::future::LocalBoxFuture;

/// Exponential backoff for storage writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

/// Something that can wait without blocking the event loop.
pub trait Pause {
    fn pause(&self, duration: Duration) -> LocalBoxFuture<'_, ()>;
}

/// Resolves immediately. Used natively and in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl Pause for Immediate {
    fn pause(&self, _duration: Duration) -> LocalBoxFuture<'_, ()> {
        Box::pin(futures::future::ready(()))
    }
}

/// Waits on `setTimeout`.
#[cfg(all(target_arch = "wasm32", feature = "web-storage"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserTimeout;

#[cfg(all(target_arch = "wasm32", feature = "web-storage"))]
impl Pause for BrowserTimeout {
    fn pause(&self, duration: Duration) -> LocalBoxFuture<'_, ()> {
        let millis = duration.as_millis().min(i32::MAX as u128) as i32;
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            match web_sys::window() {
                Some(window) => {
                    if window
                        .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
                        .is_err()
                    {
                        let _ = resolve.call0(&wasm_bindgen::JsValue::NULL);
                    }
                }
                None => {
                    let _ = resolve.call0(&wasm_bindgen::JsValue::NULL);
                }
            }
        });
        Box::pin(async move {
            let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
        })
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up, pausing
/// between attempts. The last error is returned to the caller.
pub async fn retry<T, E: Display>(
    policy: &RetryPolicy,
    pause: &dyn Pause,
    what: &str,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("{what} succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "{what} failed (attempt {attempt}/{max_attempts}): {e}; retrying in {}ms",
                    delay.as_millis()
                );
                pause.pause(delay).await;
                attempt += 1;
            }
            Err(e) => {
                log::error!("{what} failed after {max_attempts} attempts: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder(RefCell<Vec<Duration>>);

    impl Pause for Recorder {
        fn pause(&self, duration: Duration) -> LocalBoxFuture<'_, ()> {
            self.0.borrow_mut().push(duration);
            Box::pin(futures::future::ready(()))
        }
    }

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let recorder = Recorder(RefCell::new(Vec::new()));
        let mut calls = 0;
        let result: Result<u32, String> = futures::executor::block_on(retry(
            &RetryPolicy::default(),
            &recorder,
            "save",
            || {
                calls += 1;
                if calls < 3 { Err("busy".to_string()) } else { Ok(calls) }
            },
        ));
        assert_eq!(result, Ok(3));
        assert_eq!(
            *recorder.0.borrow(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn gives_up_and_returns_last_error() {
        let mut calls = 0;
        let result: Result<(), String> = futures::executor::block_on(retry(
            &RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
            &Immediate,
            "save",
            || {
                calls += 1;
                Err(format!("failure {calls}"))
            },
        ));
        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls, 2);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let _: Result<(), &str> = futures::executor::block_on(retry(
            &RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::default()
            },
            &Immediate,
            "save",
            || {
                calls += 1;
                Err("nope")
            },
        ));
        assert_eq!(calls, 1);
    }
}
