//! Timer gate: debounce / throttle wrapper around a persistence effect
//!
//! The gate is an explicit state machine holding at most one scheduled call.
//! Every schedule or cancel bumps a generation counter; a timer that wakes up
//! with a stale generation exits without running the effect.

use globstate_core::{RateLimitConfig, RateLimitKind, StateKey, StateResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Stand-in for windows too long to be represented as an instant
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The side effect being rate limited
pub type PersistEffect<T> = Arc<dyn Fn(StateKey, T) -> BoxFuture<'static, StateResult<()>> + Send + Sync>;

/// Fire-and-forget entry point returned by a rate limiter
pub type RateLimitedFn<T> = Arc<dyn Fn(StateKey, T) + Send + Sync>;

/// Factory for a caller-supplied rate limiter
pub type CustomRateLimiter<T> = Arc<dyn Fn(PersistEffect<T>, Duration) -> RateLimitedFn<T> + Send + Sync>;

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Rate limit policy for a gate
pub enum RateLimit<T> {
    Debounce(Duration),
    Throttle(Duration),
    /// Opaque caller-supplied limiter. The gate cannot cancel its timers
    /// and does not run the start/end hooks around it.
    Custom {
        delay: Duration,
        factory: CustomRateLimiter<T>,
    },
}

impl<T> RateLimit<T> {
    pub fn custom<F>(delay: Duration, factory: F) -> Self
    where
        F: Fn(PersistEffect<T>, Duration) -> RateLimitedFn<T> + Send + Sync + 'static,
    {
        RateLimit::Custom {
            delay,
            factory: Arc::new(factory),
        }
    }

    pub fn delay(&self) -> Duration {
        match self {
            RateLimit::Debounce(delay) | RateLimit::Throttle(delay) => *delay,
            RateLimit::Custom { delay, .. } => *delay,
        }
    }
}

impl<T> Clone for RateLimit<T> {
    fn clone(&self) -> Self {
        match self {
            RateLimit::Debounce(delay) => RateLimit::Debounce(*delay),
            RateLimit::Throttle(delay) => RateLimit::Throttle(*delay),
            RateLimit::Custom { delay, factory } => RateLimit::Custom {
                delay: *delay,
                factory: factory.clone(),
            },
        }
    }
}

impl<T> fmt::Debug for RateLimit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimit::Debounce(delay) => write!(f, "Debounce({:?})", delay),
            RateLimit::Throttle(delay) => write!(f, "Throttle({:?})", delay),
            RateLimit::Custom { delay, .. } => write!(f, "Custom({:?})", delay),
        }
    }
}

impl<T> From<RateLimitConfig> for RateLimit<T> {
    fn from(config: RateLimitConfig) -> Self {
        match config.kind {
            RateLimitKind::Debounce => RateLimit::Debounce(config.delay()),
            RateLimitKind::Throttle => RateLimit::Throttle(config.delay()),
        }
    }
}

/// Callbacks run around every effect executed by a timed gate
#[derive(Clone, Default)]
pub struct GateHooks {
    on_start: Option<Hook>,
    on_end: Option<Hook>,
}

impl GateHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    pub fn on_end(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(hook));
        self
    }

    fn start(&self) -> HookGuard {
        if let Some(hook) = &self.on_start {
            hook();
        }
        HookGuard {
            on_end: self.on_end.clone(),
        }
    }
}

/// Runs `on_end` when the effect settles, fails, or its task is aborted
struct HookGuard {
    on_end: Option<Hook>,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if let Some(hook) = &self.on_end {
            hook();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimedKind {
    Debounce,
    Throttle,
}

#[derive(Default)]
struct GateState {
    pending: Option<JoinHandle<()>>,
    last_fire: Option<Instant>,
    generation: u64,
}

impl GateState {
    /// Invalidate and abort the scheduled call, if any; returns the new generation
    fn invalidate(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.generation
    }
}

struct GateShared<T> {
    effect: PersistEffect<T>,
    hooks: GateHooks,
    state: Mutex<GateState>,
}

impl<T: Send + 'static> GateShared<T> {
    async fn run(&self, key: StateKey, value: T) {
        let guard = self.hooks.start();
        self.execute(guard, key, value).await
    }

    async fn execute(&self, _guard: HookGuard, key: StateKey, value: T) {
        if let Err(e) = (self.effect)(key.clone(), value).await {
            warn!(key = %key, error = %e, "rate-limited persistence failed");
        }
    }

    /// Claim a timer that woke up; false if it was replaced or cancelled meanwhile
    fn claim(&self, generation: u64, record_fire: bool) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.pending = None;
        if record_fire {
            state.last_fire = Some(Instant::now());
        }
        true
    }
}

enum GateMode<T> {
    Timed {
        kind: TimedKind,
        delay: Duration,
        shared: Arc<GateShared<T>>,
    },
    Custom(RateLimitedFn<T>),
}

/// A rate-limited wrapper around a persistence effect.
///
/// Must be called from within a tokio runtime. Dropping the gate cancels any
/// scheduled call; an effect that already started runs to completion.
pub struct TimerGate<T> {
    mode: GateMode<T>,
}

impl<T: Send + 'static> TimerGate<T> {
    pub fn new(effect: PersistEffect<T>, policy: RateLimit<T>, hooks: GateHooks) -> Self {
        let timed = |kind, delay| GateMode::Timed {
            kind,
            delay,
            shared: Arc::new(GateShared {
                effect: effect.clone(),
                hooks: hooks.clone(),
                state: Mutex::new(GateState::default()),
            }),
        };

        let mode = match policy {
            RateLimit::Debounce(delay) => timed(TimedKind::Debounce, delay),
            RateLimit::Throttle(delay) => timed(TimedKind::Throttle, delay),
            RateLimit::Custom { delay, factory } => GateMode::Custom(factory(effect.clone(), delay)),
        };

        Self { mode }
    }

    /// Submit a call; the effect runs according to the policy
    pub fn call(&self, key: StateKey, value: T) {
        match &self.mode {
            GateMode::Timed {
                kind: TimedKind::Debounce,
                delay,
                shared,
            } => Self::debounce(shared, *delay, key, value),
            GateMode::Timed {
                kind: TimedKind::Throttle,
                delay,
                shared,
            } => Self::throttle(shared, *delay, key, value),
            GateMode::Custom(func) => func(key, value),
        }
    }

    fn debounce(shared: &Arc<GateShared<T>>, delay: Duration, key: StateKey, value: T) {
        let mut state = shared.state.lock();
        let generation = state.invalidate();
        let deadline = deadline_after(Instant::now(), delay);

        let task_shared = shared.clone();
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if task_shared.claim(generation, false) {
                task_shared.run(key, value).await;
            }
        }));
        debug!(delay_ms = delay.as_millis() as u64, "debounced write scheduled");
    }

    fn throttle(shared: &Arc<GateShared<T>>, delay: Duration, key: StateKey, value: T) {
        let mut state = shared.state.lock();
        let now = Instant::now();

        match state.last_fire {
            Some(last) if now.duration_since(last) < delay => {
                let generation = state.invalidate();
                let deadline = deadline_after(last, delay);
                let task_shared = shared.clone();
                state.pending = Some(tokio::spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    if task_shared.claim(generation, true) {
                        task_shared.run(key, value).await;
                    }
                }));
                debug!("throttled write deferred to window boundary");
            }
            _ => {
                // A deferred call holds an older value than this one
                state.invalidate();
                state.last_fire = Some(now);
                // Started before the spawn so the write is visible right away
                let guard = shared.hooks.start();
                let task_shared = shared.clone();
                tokio::spawn(async move {
                    task_shared.execute(guard, key, value).await;
                });
            }
        }
    }

    /// Cancel the scheduled call without firing it
    pub fn cancel(&self) {
        match &self.mode {
            GateMode::Timed { shared, .. } => {
                shared.state.lock().invalidate();
            }
            GateMode::Custom(_) => {
                debug!("custom rate limiter manages its own timers, nothing to cancel");
            }
        }
    }

    /// Whether a call is scheduled but has not started
    pub fn has_pending(&self) -> bool {
        match &self.mode {
            GateMode::Timed { shared, .. } => shared.state.lock().pending.is_some(),
            GateMode::Custom(_) => false,
        }
    }
}

impl<T> Drop for TimerGate<T> {
    fn drop(&mut self) {
        if let GateMode::Timed { shared, .. } = &self.mode {
            shared.state.lock().invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use globstate_core::StateError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{advance, sleep};

    type Calls = Arc<Mutex<Vec<(Instant, i32)>>>;

    fn recording_effect(calls: Calls) -> PersistEffect<i32> {
        Arc::new(move |_key: StateKey, value: i32| -> BoxFuture<'static, StateResult<()>> {
            let calls = calls.clone();
            Box::pin(async move {
                calls.lock().push((Instant::now(), value));
                Ok(())
            })
        })
    }

    fn key() -> StateKey {
        StateKey::from("@test/gate")
    }

    fn values(calls: &Calls) -> Vec<i32> {
        calls.lock().iter().map(|(_, v)| *v).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_fires_once_with_last_value() {
        let calls: Calls = Arc::default();
        let gate = TimerGate::new(
            recording_effect(calls.clone()),
            RateLimit::Debounce(Duration::from_millis(500)),
            GateHooks::new(),
        );
        let start = Instant::now();

        gate.call(key(), 1);
        advance(Duration::from_millis(5)).await;
        gate.call(key(), 2);
        advance(Duration::from_millis(5)).await;
        gate.call(key(), 3);
        assert!(gate.has_pending());

        sleep(Duration::from_millis(400)).await;
        assert!(values(&calls).is_empty());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(values(&calls), vec![3]);
        assert!(calls.lock()[0].0 - start >= Duration::from_millis(510));
        assert!(!gate.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_cancel_drops_pending_call() {
        let calls: Calls = Arc::default();
        let gate = TimerGate::new(
            recording_effect(calls.clone()),
            RateLimit::Debounce(Duration::from_millis(100)),
            GateHooks::new(),
        );

        gate.call(key(), 1);
        gate.cancel();
        assert!(!gate.has_pending());

        sleep(Duration::from_millis(300)).await;
        assert!(values(&calls).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_call() {
        let calls: Calls = Arc::default();
        let gate = TimerGate::new(
            recording_effect(calls.clone()),
            RateLimit::Debounce(Duration::from_millis(100)),
            GateHooks::new(),
        );

        gate.call(key(), 1);
        drop(gate);

        sleep(Duration::from_millis(300)).await;
        assert!(values(&calls).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_leading_and_trailing() {
        let calls: Calls = Arc::default();
        let gate = TimerGate::new(
            recording_effect(calls.clone()),
            RateLimit::Throttle(Duration::from_millis(500)),
            GateHooks::new(),
        );
        let start = Instant::now();

        gate.call(key(), 1);
        tokio::task::yield_now().await;
        assert_eq!(values(&calls), vec![1]);

        advance(Duration::from_millis(100)).await;
        gate.call(key(), 2);
        advance(Duration::from_millis(100)).await;
        gate.call(key(), 3);

        sleep(Duration::from_millis(400)).await;
        assert_eq!(values(&calls), vec![1, 3]);

        let trailing_at = calls.lock()[1].0 - start;
        assert!(trailing_at >= Duration::from_millis(500));
        assert!(trailing_at < Duration::from_millis(510));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_fires_immediately_after_quiet_window() {
        let calls: Calls = Arc::default();
        let gate = TimerGate::new(
            recording_effect(calls.clone()),
            RateLimit::Throttle(Duration::from_millis(200)),
            GateHooks::new(),
        );

        gate.call(key(), 1);
        sleep(Duration::from_millis(250)).await;
        gate.call(key(), 2);
        tokio::task::yield_now().await;

        assert_eq!(values(&calls), vec![1, 2]);
        assert!(!gate.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_cancel_drops_trailing_call() {
        let calls: Calls = Arc::default();
        let gate = TimerGate::new(
            recording_effect(calls.clone()),
            RateLimit::Throttle(Duration::from_millis(200)),
            GateHooks::new(),
        );

        gate.call(key(), 1);
        gate.call(key(), 2);
        assert!(gate.has_pending());
        gate.cancel();

        sleep(Duration::from_millis(500)).await;
        assert_eq!(values(&calls), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hooks_wrap_effect_even_on_failure() {
        let started = Arc::new(AtomicUsize::new(0));
        let ended = Arc::new(AtomicUsize::new(0));
        let effect: PersistEffect<i32> =
            Arc::new(|key: StateKey, _value: i32| -> BoxFuture<'static, StateResult<()>> {
                Box::pin(async move { Err(StateError::write_failed(key, "disk full")) })
            });

        let hooks = {
            let started = started.clone();
            let ended = ended.clone();
            GateHooks::new()
                .on_start(move || {
                    started.fetch_add(1, Ordering::SeqCst);
                })
                .on_end(move || {
                    ended.fetch_add(1, Ordering::SeqCst);
                })
        };
        let gate = TimerGate::new(effect, RateLimit::Debounce(Duration::from_millis(50)), hooks);

        gate.call(key(), 1);
        sleep(Duration::from_millis(100)).await;

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_limiter_is_opaque() {
        let calls: Calls = Arc::default();
        let built_with = Arc::new(Mutex::new(None));
        let recorded_delay = built_with.clone();

        let policy = RateLimit::custom(Duration::from_millis(750), move |effect, delay| {
            *recorded_delay.lock() = Some(delay);
            Arc::new(move |key: StateKey, value: i32| {
                let effect = effect.clone();
                tokio::spawn(async move {
                    let _ = effect(key, value * 10).await;
                });
            }) as RateLimitedFn<i32>
        });
        let gate = TimerGate::new(recording_effect(calls.clone()), policy, GateHooks::new());

        gate.call(key(), 4);
        gate.cancel();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(*built_with.lock(), Some(Duration::from_millis(750)));
        assert_eq!(values(&calls), vec![40]);
        assert!(!gate.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_window_does_not_overflow() {
        let calls: Calls = Arc::default();
        let debounced = TimerGate::new(
            recording_effect(calls.clone()),
            RateLimit::Debounce(Duration::MAX),
            GateHooks::new(),
        );
        debounced.call(key(), 1);
        assert!(debounced.has_pending());

        let throttled = TimerGate::new(
            recording_effect(calls.clone()),
            RateLimit::Throttle(Duration::MAX),
            GateHooks::new(),
        );
        throttled.call(key(), 2);
        throttled.call(key(), 3);
        assert!(throttled.has_pending());

        sleep(Duration::from_secs(3600)).await;
        assert_eq!(values(&calls), vec![2]);

        debounced.cancel();
        throttled.cancel();
        assert!(!debounced.has_pending() && !throttled.has_pending());
    }

    #[test]
    fn test_policy_from_config() {
        let debounce: RateLimit<i32> = RateLimitConfig::debounce(2000).into();
        assert!(matches!(debounce, RateLimit::Debounce(d) if d == Duration::from_secs(2)));

        let throttle: RateLimit<i32> = RateLimitConfig::throttle(1000).into();
        assert_eq!(throttle.delay(), Duration::from_secs(1));
    }
}
