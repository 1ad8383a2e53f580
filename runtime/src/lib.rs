//! # Aperture Runtime
//!
//! Runtime implementation for the Aperture booking client architecture.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation Registry**: Backs `Effect::Cancellable` / `Effect::Cancel`
//!   so a reducer can keep at most one scheduled effect per id (countdown
//!   timers in particular)
//!
//! ## Example
//!
//! ```ignore
//! use aperture_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! let handle = store.send(Action::DoSomething).await?;
//! handle.wait().await;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use aperture_core::effect::{Effect, EffectId};
use aperture_core::reducer::Reducer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::AbortHandle;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// An effect execution failed
        ///
        /// This error is logged but does not halt the store.
        /// Effects are fire-and-forget operations.
        #[error("Effect execution failed: {0}")]
        EffectFailed(String),

        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects spawned by
/// that action to complete.
///
/// # Example
///
/// ```ignore
/// let handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    ///
    /// Useful for initialization in loops where you need a `last_handle`.
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Wait for all effects spawned by the action to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            let _ = self.completion.changed().await;
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Ensures the counter is always decremented, even if the effect panics or
/// its task is aborted through the cancellation registry.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registry of in-flight cancellable effects, keyed by [`EffectId`]
///
/// Holds the abort handle of the task running each cancellable effect. At
/// most one task per id: registering under an id that is already occupied
/// aborts the previous task first. Cancelling an id with nothing in flight
/// is a no-op.
#[derive(Clone, Default)]
struct CancellationRegistry {
    handles: Arc<Mutex<HashMap<EffectId, AbortHandle>>>,
}

impl CancellationRegistry {
    /// Register a task under `id`, aborting any previous task under that id
    fn register(&self, id: EffectId, handle: AbortHandle) {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = handles.insert(id, handle) {
            tracing::debug!(effect_id = %id, "Replacing in-flight cancellable effect");
            previous.abort();
        }
    }

    /// Abort whatever is registered under `id` (idempotent)
    ///
    /// A registration left behind by an already-finished task is removed the
    /// same way; aborting a finished task is a no-op.
    fn cancel(&self, id: EffectId) {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = handles.remove(&id) {
            tracing::debug!(effect_id = %id, "Cancelling in-flight effect");
            handle.abort();
        }
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        AbortHandle, Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, CancellationRegistry,
        DecrementGuard, Duration, Effect, EffectHandle, EffectTracking, Ordering, Reducer, RwLock,
        StoreError, watch,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellations: CancellationRegistry,
        /// Action broadcast channel for observing actions produced by effects.
        ///
        /// All actions produced by effects (e.g., from `Effect::Future`) are
        /// broadcast to observers. This enables request-response patterns and
        /// UI event streaming (countdown updates, low-time warnings).
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Action broadcast capacity defaults to 16; increase with
        /// [`Store::with_broadcast_capacity`] if observers frequently lag.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new Store with custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellations: CancellationRegistry::default(),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// This is the primary way to interact with the store:
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Executes returned effects asynchronously
        /// 4. Effects may produce more actions (feedback loop)
        ///
        /// The reducer executes synchronously while holding the write lock;
        /// effects execute in spawned tasks, so `send()` returns after
        /// starting effect execution, not completion. Use the returned
        /// [`EffectHandle`] to wait.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            // Check if store is shutting down
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            tracing::debug!("Processing action");
            metrics::counter!("store.actions.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(start.elapsed().as_secs_f64());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());

                effects
            };

            for effect in effects {
                self.execute_effect_internal(effect, tracking.clone());
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Designed for request-response flows: subscribes to the action
        /// broadcast BEFORE sending (avoids a race), sends the initial
        /// action, then waits for the first action matching the predicate.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: timeout expired before a matching action
        /// - [`StoreError::ChannelClosed`]: action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {}, // Not the action we want, keep waiting
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Slow consumer: if the terminal action was
                            // dropped, the timeout catches it
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        ///
        /// Only actions produced by effects are broadcast, not the initial
        /// actions sent via [`Store::send`].
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let step = store.state(|s| s.wizard_step).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Sets the shutdown flag (rejecting new actions), then waits for
        /// pending effects to complete.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires
        /// before all pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(100);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running",
                        pending
                    );
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Feed an effect-produced action back into the store
        ///
        /// Broadcast first so observers see every feedback action, then
        /// dispatch through the normal reduce path.
        async fn feedback(&self, action: A) {
            let _ = self.action_broadcast.send(action.clone());
            let _ = self.send(action).await;
        }

        /// Execute an effect with tracking
        ///
        /// # Effect Types
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, sends resulting action if `Some`
        /// - `Delay`: Waits for duration, then sends action
        /// - `Parallel`: Executes effects concurrently
        /// - `Sequential`: Executes effects in order, waiting for each to complete
        /// - `Cancellable`: Runs the inner effect in an abortable task
        ///   registered under its id (replacing any previous task)
        /// - `Cancel`: Aborts the task registered under the id, if any
        ///
        /// # Error Handling Strategy
        ///
        /// Reducer panics propagate (fail fast). Effect failures are logged
        /// and do not halt the store; [`DecrementGuard`] keeps the effect
        /// counter consistent even on panic or abort.
        #[allow(clippy::too_many_lines)]
        #[tracing::instrument(skip(self, effect, tracking), name = "execute_effect")]
        fn execute_effect_internal(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let store = self.clone();
                    let _ = self.spawn_tracked(tracking, async move {
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action");
                            store.feedback(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    let store = self.clone();
                    let _ = self.spawn_tracked(tracking, async move {
                        tokio::time::sleep(duration).await;
                        store.feedback(*action).await;
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect_internal(effect, tracking.clone());
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);
                    let store = self.clone();
                    let _ = self.spawn_tracked(tracking, async move {
                        for effect in effects {
                            // Sub-tracking so each effect completes before the next starts
                            let (sub_tx, mut sub_rx) = watch::channel(());
                            let sub_tracking = EffectTracking {
                                counter: Arc::new(AtomicUsize::new(0)),
                                notifier: sub_tx,
                            };

                            store.execute_effect_internal(effect, sub_tracking.clone());

                            while sub_tracking.counter.load(Ordering::SeqCst) > 0 {
                                let _ = sub_rx.changed().await;
                            }
                        }
                    });
                },
                Effect::Cancellable { id, effect } => {
                    metrics::counter!("store.effects.executed", "type" => "cancellable")
                        .increment(1);
                    match *effect {
                        inner @ (Effect::Future(_) | Effect::Delay { .. }) => {
                            let registry = self.cancellations.clone();
                            let store = self.clone();
                            let abort = self.spawn_tracked(tracking, async move {
                                match inner {
                                    Effect::Future(fut) => {
                                        if let Some(action) = fut.await {
                                            store.feedback(action).await;
                                        }
                                    },
                                    Effect::Delay { duration, action } => {
                                        tokio::time::sleep(duration).await;
                                        store.feedback(*action).await;
                                    },
                                    _ => {},
                                }
                            });
                            registry.register(id, abort);
                        },
                        other => {
                            // Only leaf effects can be aborted cleanly
                            tracing::warn!(
                                effect_id = %id,
                                "Cancellable wraps a non-leaf effect, executing without cancellation"
                            );
                            self.execute_effect_internal(other, tracking);
                        },
                    }
                },
                Effect::Cancel(id) => {
                    metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                    self.cancellations.cancel(id);
                },
            }
        }

        /// Spawn a tracked effect task and return its abort handle
        ///
        /// The task carries a [`DecrementGuard`] and a pending-effects guard
        /// so both counters stay consistent whether the task completes,
        /// panics, or is aborted.
        fn spawn_tracked<Fut>(&self, tracking: EffectTracking, body: Fut) -> AbortHandle
        where
            Fut: std::future::Future<Output = ()> + Send + 'static,
        {
            tracking.increment();

            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

            let handle = tokio::spawn(async move {
                let _guard = DecrementGuard(tracking);
                let _pending_guard = pending_guard; // Decrement on drop
                body.await;
            });
            handle.abort_handle()
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: self.cancellations.clone(),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)] // Tests are allowed to panic on failures
mod tests {
    use super::*;
    use aperture_core::effect::{Effect, EffectId};
    use aperture_core::reducer::Reducer;
    use aperture_core::{SmallVec, smallvec};
    use std::time::Duration;

    const TICKER: EffectId = EffectId::new("ticker");

    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Increment,
        Decrement,
        NoOp,
        ProduceEffect,
        ProduceDelayedAction,
        ProduceParallelEffects,
        ProduceSequentialEffects,
        StartCancellableDelay(Duration),
        CancelDelay,
    }

    #[derive(Debug, Clone)]
    struct TestEnv;

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    smallvec![Effect::None]
                },
                TestAction::NoOp => smallvec![Effect::None],
                TestAction::ProduceEffect => {
                    smallvec![Effect::future(async { Some(TestAction::Increment) })]
                },
                TestAction::ProduceDelayedAction => {
                    smallvec![Effect::Delay {
                        duration: Duration::from_millis(10),
                        action: Box::new(TestAction::Increment),
                    }]
                },
                TestAction::ProduceParallelEffects => {
                    smallvec![Effect::Parallel(vec![
                        Effect::future(async { Some(TestAction::Increment) }),
                        Effect::future(async { Some(TestAction::Increment) }),
                        Effect::future(async { Some(TestAction::Increment) }),
                    ])]
                },
                TestAction::ProduceSequentialEffects => {
                    smallvec![Effect::Sequential(vec![
                        Effect::future(async { Some(TestAction::Increment) }),
                        Effect::future(async { Some(TestAction::Increment) }),
                        Effect::future(async { Some(TestAction::Decrement) }),
                    ])]
                },
                TestAction::StartCancellableDelay(duration) => {
                    smallvec![Effect::timer(TICKER, duration, TestAction::Increment)]
                },
                TestAction::CancelDelay => {
                    smallvec![Effect::Cancel(TICKER)]
                },
            }
        }
    }

    fn test_store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState { value: 0 }, TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn test_store_creation() {
        let store = test_store();
        assert_eq!(store.state(|s| s.value).await, 0);
    }

    #[tokio::test]
    async fn test_send_action() {
        let store = test_store();
        let _ = store.send(TestAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_effect_future_feeds_back() {
        let store = test_store();
        let mut handle = store.send(TestAction::ProduceEffect).await.unwrap();
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

        // Feedback action dispatch is itself asynchronous
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_effect_delay() {
        let store = test_store();
        let _ = store.send(TestAction::ProduceDelayedAction).await.unwrap();

        assert_eq!(store.state(|s| s.value).await, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_effect_parallel() {
        let store = test_store();
        let _ = store.send(TestAction::ProduceParallelEffects).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.state(|s| s.value).await, 3);
    }

    #[tokio::test]
    async fn test_effect_sequential() {
        let store = test_store();
        let _ = store.send(TestAction::ProduceSequentialEffects).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Net result: +1 +1 -1 = 1
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_cancel_aborts_scheduled_delay() {
        let store = test_store();
        let _ = store
            .send(TestAction::StartCancellableDelay(Duration::from_millis(30)))
            .await
            .unwrap();
        let _ = store.send(TestAction::CancelDelay).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The delayed increment never fires
        assert_eq!(store.state(|s| s.value).await, 0);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let store = test_store();
        // Nothing scheduled: cancelling must be a no-op, twice
        let _ = store.send(TestAction::CancelDelay).await.unwrap();
        let _ = store.send(TestAction::CancelDelay).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 0);
    }

    #[tokio::test]
    async fn test_rescheduling_replaces_previous_timer() {
        let store = test_store();
        let _ = store
            .send(TestAction::StartCancellableDelay(Duration::from_millis(20)))
            .await
            .unwrap();
        // Re-scheduling under the same id aborts the first delay
        let _ = store
            .send(TestAction::StartCancellableDelay(Duration::from_millis(20)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        // Only the replacement fires
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_send_and_wait_for() {
        let store = test_store();
        let result = store
            .send_and_wait_for(
                TestAction::ProduceEffect,
                |a| matches!(a, TestAction::Increment),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(matches!(result, TestAction::Increment));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_actions() {
        let store = test_store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();

        let result = store.send(TestAction::Increment).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_pending_effects() {
        let store = test_store();
        let _ = store.send(TestAction::ProduceDelayedAction).await.unwrap();

        // Ok means the pending-effect count reached zero within the timeout
        store.shutdown(Duration::from_secs(2)).await.unwrap();
        let result = store.send(TestAction::NoOp).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }
}
