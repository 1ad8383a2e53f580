//! # Aperture Core
//!
//! Core traits and types for the Aperture booking client architecture.
//!
//! The booking client is built as a set of reducers driven by a store
//! runtime. This crate provides the abstractions shared by every feature:
//!
//! - **State**: Domain state for a feature
//! - **Action**: All possible inputs to a reducer (commands and events)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Unidirectional Data Flow
//! - Explicit Effects (no hidden I/O)
//! - Dependency Injection via Environment
//!
//! ## Example
//!
//! ```ignore
//! use aperture_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! impl Reducer for WizardReducer {
//!     type State = WizardState;
//!     type Action = WizardAction;
//!     type Environment = WizardEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut WizardState,
//!         action: WizardAction,
//!         env: &WizardEnvironment,
//!     ) -> SmallVec<[Effect<WizardAction>; 4]> {
//!         // Business logic goes here
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime. Most actions produce zero
        /// or one effect, so the vector is inlined up to four entries.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable and cancellable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Identity of a cancellable effect.
    ///
    /// Effects scheduled under the same id replace each other: scheduling a
    /// new `Cancellable` effect cancels whatever was previously in flight
    /// under that id. Ids are static strings so reducers can declare them as
    /// constants.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EffectId(&'static str);

    impl EffectId {
        /// Create an effect id from a static name
        #[must_use]
        pub const fn new(name: &'static str) -> Self {
            Self(name)
        }

        /// The name this id was created with
        #[must_use]
        pub const fn name(&self) -> &'static str {
            self.0
        }
    }

    impl std::fmt::Display for EffectId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and executed by the Store
    /// runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    #[allow(missing_docs)]
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timers, timeouts)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// A cancellable effect registered under an id
        ///
        /// Scheduling a new `Cancellable` under an id that is already in
        /// flight cancels the previous one first, so at most one effect per
        /// id runs at a time.
        Cancellable {
            /// Registration id for later cancellation
            id: EffectId,
            /// The effect to run (only `Delay` and `Future` can be cancelled)
            effect: Box<Effect<Action>>,
        },

        /// Cancel whatever is in flight under the id
        ///
        /// Idempotent: cancelling an id with nothing in flight is a no-op.
        Cancel(EffectId),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap an async computation as an effect
        pub fn future<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Register this effect under `id` so it can be cancelled later
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(self),
            }
        }

        /// Schedule `action` after `duration`, cancellable under `id`
        #[must_use]
        pub fn timer(id: EffectId, duration: Duration, action: Action) -> Effect<Action> {
            Effect::Delay {
                duration,
                action: Box::new(action),
            }
            .cancellable(id)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Production code injects [`SystemClock`]; tests inject a fixed or
    /// advanceable clock so countdown logic is deterministic.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)] // Tests are allowed to panic on failures
mod tests {
    use super::effect::{Effect, EffectId};
    use super::environment::{Clock, SystemClock};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    enum TestAction {
        Tick,
    }

    #[test]
    fn effect_id_equality_is_by_name() {
        const A: EffectId = EffectId::new("countdown");
        const B: EffectId = EffectId::new("countdown");
        const C: EffectId = EffectId::new("cleanup");

        assert_eq!(A, B);
        assert_ne!(A, C);
        assert_eq!(A.name(), "countdown");
    }

    #[test]
    fn timer_wraps_delay_in_cancellable() {
        const TIMER: EffectId = EffectId::new("timer");
        let effect = Effect::timer(TIMER, Duration::from_secs(1), TestAction::Tick);

        match effect {
            Effect::Cancellable { id, effect } => {
                assert_eq!(id, TIMER);
                assert!(matches!(*effect, Effect::Delay { duration, .. } if duration == Duration::from_secs(1)));
            },
            other => panic!("expected Cancellable, got {other:?}"),
        }
    }

    #[test]
    fn debug_formats_every_variant() {
        const ID: EffectId = EffectId::new("dbg");
        let effects: Vec<Effect<TestAction>> = vec![
            Effect::None,
            Effect::Parallel(vec![]),
            Effect::Sequential(vec![]),
            Effect::future(async { None }),
            Effect::Cancel(ID),
        ];

        let rendered: Vec<String> = effects.iter().map(|e| format!("{e:?}")).collect();
        assert!(rendered[0].contains("None"));
        assert!(rendered[3].contains("future"));
        assert!(rendered[4].contains("dbg"));
    }

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
