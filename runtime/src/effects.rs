//! Effect interpretation.
//!
//! [`execute`] runs one effect to completion and returns the action it
//! produced, if any. [`drive`] closes the loop: it reduces an action,
//! executes the resulting effects and feeds every produced action back into
//! the reducer until the queue is empty.
//!
//! Unlike a long-lived store, effects here are awaited inline so callers
//! (request handlers) see the settled state before they respond.

use courtside_core::effect::Effect;
use courtside_core::reducer::Reducer;
use std::collections::VecDeque;

/// Upper bound on feedback rounds for a single [`drive`] call.
pub const MAX_FEEDBACK_ROUNDS: usize = 64;

/// Execute an effect and collect the actions it feeds back.
pub async fn execute<A>(effect: Effect<A>) -> Vec<A> {
    match effect {
        Effect::None => {
            tracing::trace!("Executing Effect::None (no-op)");
            Vec::new()
        },
        Effect::Future(fut) => {
            tracing::trace!("Executing Effect::Future");
            metrics::counter!("effects_executed_total", "type" => "future").increment(1);
            fut.await.into_iter().collect()
        },
    }
}

/// Reduce `action` and keep feeding produced actions back until quiescent.
///
/// Returns the number of actions reduced (the initial one included). Stops
/// after [`MAX_FEEDBACK_ROUNDS`] and logs an error if a reducer keeps
/// producing actions.
pub async fn drive<R>(reducer: &R, state: &mut R::State, action: R::Action, env: &R::Environment) -> usize
where
    R: Reducer,
    R::Action: Send + 'static,
{
    let mut queue = VecDeque::from([action]);
    let mut reduced = 0;

    while let Some(next) = queue.pop_front() {
        if reduced >= MAX_FEEDBACK_ROUNDS {
            tracing::error!(reduced, "Feedback loop did not settle, dropping remaining actions");
            break;
        }
        reduced += 1;

        for effect in reducer.reduce(state, next, env) {
            if effect.is_none() {
                continue;
            }
            queue.extend(execute(effect).await);
        }
    }

    reduced
}
