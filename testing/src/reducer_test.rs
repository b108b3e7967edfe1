//! Given-When-Then harness for reducers.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use courtside_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Type alias for feedback-action assertion functions
type FeedbackAssertion<A> = Box<dyn FnOnce(&[A])>;

/// Fluent reducer test.
///
/// `given_actions` replays setup actions (their effects are discarded), then
/// `when_action` is reduced and every assertion runs against the outcome.
/// [`ReducerTest::run_async`] additionally executes the produced effects and
/// hands the feedback actions to `then_feedback` assertions.
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    setup: Vec<R::Action>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    effect_assertions: Vec<EffectAssertion<R::Action>>,
    feedback_assertions: Vec<FeedbackAssertion<R::Action>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            setup: Vec::new(),
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
            feedback_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Reduce these actions before the one under test (Given)
    #[must_use]
    pub fn given_actions(mut self, actions: impl IntoIterator<Item = R::Action>) -> Self {
        self.setup.extend(actions);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<R::Action>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about actions fed back by the effects (Then).
    ///
    /// Only checked by [`ReducerTest::run_async`].
    #[must_use]
    pub fn then_feedback<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[R::Action]) + 'static,
    {
        self.feedback_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all synchronous assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let Self {
            reducer,
            environment,
            initial_state,
            setup,
            action,
            state_assertions,
            effect_assertions,
            feedback_assertions: _,
        } = self;

        let mut state = initial_state.expect("Initial state must be set with given_state()");
        let action = action.expect("Action must be set with when_action()");
        let env = environment.expect("Environment must be set with with_env()");

        for given in setup {
            let _ = reducer.reduce(&mut state, given, &env);
        }
        let effects = reducer.reduce(&mut state, action, &env);

        for assertion in state_assertions {
            assertion(&state);
        }
        for assertion in effect_assertions {
            assertion(&effects);
        }
    }

    /// Run the test, then execute the effects and check feedback assertions
    ///
    /// # Panics
    ///
    /// Same conditions as [`ReducerTest::run`].
    #[allow(clippy::expect_used)] // Test code can use expect
    pub async fn run_async(self)
    where
        R::Action: Send + 'static,
    {
        let Self {
            reducer,
            environment,
            initial_state,
            setup,
            action,
            state_assertions,
            effect_assertions,
            feedback_assertions,
        } = self;

        let mut state = initial_state.expect("Initial state must be set with given_state()");
        let action = action.expect("Action must be set with when_action()");
        let env = environment.expect("Environment must be set with with_env()");

        for given in setup {
            let _ = reducer.reduce(&mut state, given, &env);
        }
        let effects = reducer.reduce(&mut state, action, &env);

        for assertion in state_assertions {
            assertion(&state);
        }
        for assertion in effect_assertions {
            assertion(&effects);
        }

        let mut feedback = Vec::new();
        for effect in effects {
            feedback.extend(courtside_runtime::execute(effect).await);
        }
        for assertion in feedback_assertions {
            assertion(&feedback);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use courtside_core::effect::Effect;

    /// Assert that there are no effects (or only `Effect::None`)
    ///
    /// # Panics
    ///
    /// Panics if any effect would do something.
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtside_core::{smallvec, SmallVec};

    #[derive(Clone, Debug, Default)]
    struct Tally {
        count: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TallyAction {
        Add(i32),
        Echo(i32),
    }

    struct TallyReducer;

    impl Reducer for TallyReducer {
        type State = Tally;
        type Action = TallyAction;
        type Environment = ();

        fn reduce(&self, state: &mut Tally, action: TallyAction, _env: &()) -> SmallVec<[Effect<TallyAction>; 4]> {
            match action {
                TallyAction::Add(n) => {
                    state.count += n;
                    SmallVec::new()
                },
                TallyAction::Echo(n) => smallvec![Effect::future(async move { Some(TallyAction::Add(n)) })],
            }
        }
    }

    #[test]
    fn given_actions_are_applied_first() {
        ReducerTest::new(TallyReducer)
            .with_env(())
            .given_state(Tally::default())
            .given_actions([TallyAction::Add(2), TallyAction::Add(3)])
            .when_action(TallyAction::Add(-1))
            .then_state(|s| assert_eq!(s.count, 4))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn feedback_actions_are_collected() {
        ReducerTest::new(TallyReducer)
            .with_env(())
            .given_state(Tally::default())
            .when_action(TallyAction::Echo(9))
            .then_state(|s| assert_eq!(s.count, 0))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .then_feedback(|actions| assert_eq!(actions, [TallyAction::Add(9)]))
            .run_async()
            .await;
    }
}
