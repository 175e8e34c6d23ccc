//! # Pattern dispatch: persistent handlers and one-shot waiters.
//!
//! [`PatternRegistry`] maps regex patterns to subscribers of the supervised
//! process's stdout. Two kinds of subscription exist:
//!
//! - **Persistent handlers** ([`PatternRegistry::register`]) fire on every
//!   matching line for the registry's lifetime. Registering the same
//!   pattern text twice fails loudly — it is a wiring bug, not a feature.
//! - **One-shot waiters** ([`PatternRegistry::watch`]) resolve a
//!   [`MatchFuture`] with the first matching line and are then removed.
//!   Any number of waiters may be armed, including for identical patterns.
//!
//! ## Dispatch rules
//! - Every handler whose pattern matches a line is invoked; one consumer
//!   never suppresses another.
//! - Handlers run on the reader task and must not block it; do cheap work
//!   (set a flag, publish an event) and hand anything slow to another task.
//! - Waiters are signaled through a channel, so the waiting task suspends
//!   without ever touching the reader (no polling, no busy-wait).

use std::sync::{Arc, Mutex};

use regex::Regex;
use tokio::sync::oneshot;

use crate::error::SupervisorError;

/// Callback invoked with every console line matching its pattern.
pub type Handler = Arc<dyn Fn(&str) + Send + Sync>;

struct HandlerEntry {
    pattern: String,
    regex: Regex,
    handler: Handler,
}

struct Waiter {
    regex: Regex,
    tx: oneshot::Sender<String>,
}

#[derive(Default)]
struct Inner {
    handlers: Vec<HandlerEntry>,
    waiters: Vec<Waiter>,
}

/// Maps regex patterns to handlers and waiters; evaluates incoming lines.
///
/// Registration may happen from any task; dispatch happens on the single
/// stdout reader. The internal lock is held only to snapshot matching
/// subscribers — callbacks run outside it, so a handler may safely call
/// back into the registry.
pub struct PatternRegistry {
    inner: Mutex<Inner>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Adds a persistent handler for `pattern`.
    ///
    /// Fails with [`SupervisorError::DuplicatePattern`] if a handler for the
    /// exact same pattern text is already present.
    pub fn register(
        &self,
        pattern: &str,
        handler: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<(), SupervisorError> {
        let regex = compile(pattern)?;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.handlers.iter().any(|h| h.pattern == pattern) {
            return Err(SupervisorError::DuplicatePattern {
                pattern: pattern.to_string(),
            });
        }
        inner.handlers.push(HandlerEntry {
            pattern: pattern.to_string(),
            regex,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    /// Arms a one-shot waiter for `pattern` and returns its future.
    ///
    /// The waiter observes lines dispatched **after** this call returns;
    /// arm it before sending the command that provokes the response.
    pub fn watch(&self, pattern: &str) -> Result<MatchFuture, SupervisorError> {
        let regex = compile(pattern)?;
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.waiters.push(Waiter { regex, tx });
        }
        Ok(MatchFuture {
            pattern: pattern.to_string(),
            rx,
        })
    }

    /// Evaluates one line against all handlers and waiters, in order.
    pub fn dispatch(&self, line: &str) {
        let (matched_handlers, matched_waiters) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

            let handlers: Vec<Handler> = inner
                .handlers
                .iter()
                .filter(|h| h.regex.is_match(line))
                .map(|h| Arc::clone(&h.handler))
                .collect();

            let mut fired = Vec::new();
            let mut remaining = Vec::with_capacity(inner.waiters.len());
            for waiter in inner.waiters.drain(..) {
                if waiter.regex.is_match(line) {
                    fired.push(waiter.tx);
                } else {
                    remaining.push(waiter);
                }
            }
            inner.waiters = remaining;

            (handlers, fired)
        };

        for handler in matched_handlers {
            handler(line);
        }
        for tx in matched_waiters {
            let _ = tx.send(line.to_string());
        }
    }

    /// Drops all armed waiters; their futures resolve to
    /// [`SupervisorError::WaitAborted`]. Called when the process exits.
    pub fn abort_waiters(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.waiters.clear();
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(pattern: &str) -> Result<Regex, SupervisorError> {
    Regex::new(pattern).map_err(|source| SupervisorError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// In-flight one-shot wait for a matching console line.
pub struct MatchFuture {
    pattern: String,
    rx: oneshot::Receiver<String>,
}

impl MatchFuture {
    /// Waits for the matching line with no time bound.
    pub async fn wait(self) -> Result<String, SupervisorError> {
        let pattern = self.pattern;
        self.rx
            .await
            .map_err(|_| SupervisorError::WaitAborted { pattern })
    }

    /// Waits for the matching line; `None` waits forever.
    pub async fn wait_timeout(
        self,
        timeout: Option<std::time::Duration>,
    ) -> Result<String, SupervisorError> {
        match timeout {
            None => self.wait().await,
            Some(limit) => {
                let pattern = self.pattern.clone();
                match tokio::time::timeout(limit, self.wait()).await {
                    Ok(res) => res,
                    Err(_) => Err(SupervisorError::WaitTimeout {
                        pattern,
                        timeout: limit,
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_every_matching_handler_fires() {
        let registry = PatternRegistry::new();
        let saves = Arc::new(AtomicUsize::new(0));
        let players = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&saves);
        registry.register(r"^Saving", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let p = Arc::clone(&players);
        registry.register(r"Player connected", move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        registry.dispatch("Saving...");
        registry.dispatch("[INFO] Player connected: Steve, xuid: 1");
        registry.dispatch("unrelated chatter");

        assert_eq!(saves.load(Ordering::SeqCst), 1);
        assert_eq!(players.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_pattern_fails_loudly() {
        let registry = PatternRegistry::new();
        registry.register(r"^ready$", |_| {}).unwrap();
        let err = registry.register(r"^ready$", |_| {}).unwrap_err();
        assert!(matches!(err, SupervisorError::DuplicatePattern { .. }));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let registry = PatternRegistry::new();
        assert!(matches!(
            registry.register("(unclosed", |_| {}),
            Err(SupervisorError::Pattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_waiter_resolves_on_first_match_only() {
        let registry = PatternRegistry::new();
        let fut = registry.watch(r"Data saved").unwrap();

        registry.dispatch("noise");
        registry.dispatch("Data saved. Files are now ready to be copied.");
        // Second match has no waiter left; must not panic.
        registry.dispatch("Data saved. Files are now ready to be copied.");

        let line = fut.wait_timeout(Some(Duration::from_secs(1))).await.unwrap();
        assert!(line.starts_with("Data saved"));
    }

    #[tokio::test]
    async fn test_wait_times_out_despite_unrelated_traffic() {
        let registry = PatternRegistry::new();
        let fut = registry.watch(r"never appears").unwrap();

        for i in 0..50 {
            registry.dispatch(&format!("chatter {i}"));
        }

        let err = fut
            .wait_timeout(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn test_aborted_waiter_reports_abort() {
        let registry = PatternRegistry::new();
        let fut = registry.watch(r"pending").unwrap();
        registry.abort_waiters();
        let err = fut.wait().await.unwrap_err();
        assert!(matches!(err, SupervisorError::WaitAborted { .. }));
    }

    #[tokio::test]
    async fn test_handlers_survive_waiter_resolution() {
        let registry = PatternRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        registry.register(r"tick", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let fut = registry.watch(r"tick").unwrap();
        registry.dispatch("tick 1");
        registry.dispatch("tick 2");

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(fut.wait().await.unwrap(), "tick 1");
    }
}
