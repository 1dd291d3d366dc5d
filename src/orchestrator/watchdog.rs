//! Master inactivity watchdog.
//!
//! The master's model call is raced against its activity deadline
//! (`last_activity + interval`). When the deadline passes with no child or
//! helper active, the master's stall flag and queue are reset so it can be
//! prompted again. While work is outstanding the watchdog keeps waiting.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::agents::AgentState;

#[derive(Debug, PartialEq, Eq)]
pub enum Watched<T> {
    Done(T),
    /// Deadline passed while idle; the state was reset
    Expired,
}

/// Await `call` under the watchdog of the agent behind `state`.
pub async fn watch<F, T>(state: &Mutex<AgentState>, interval: Duration, call: F) -> Watched<T>
where
    F: Future<Output = T>,
{
    tokio::pin!(call);
    // `None` is a deadline past what the clock can represent.
    let mut deadline = Instant::from_std(state.lock().await.last_activity).checked_add(interval);

    loop {
        let Some(at) = deadline else {
            return Watched::Done(call.await);
        };
        tokio::select! {
            out = &mut call => return Watched::Done(out),
            _ = tokio::time::sleep_until(at) => {
                let mut guard = state.lock().await;
                let refreshed = Instant::from_std(guard.last_activity).checked_add(interval);
                if refreshed.map_or(true, |refreshed| refreshed > Instant::now()) {
                    deadline = refreshed;
                    continue;
                }
                if guard.has_active_work() {
                    deadline = Instant::now().checked_add(interval);
                    continue;
                }

                tracing::warn!(
                    "Watchdog: {} inactive for {:?}, resetting its state",
                    guard.name,
                    interval
                );
                guard.stall = false;
                guard.prompt_queue.clear();
                return Watched::Expired;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentId, AgentKind, Scope};

    fn master() -> Mutex<AgentState> {
        let mut state = AgentState::new(AgentKind::Master, "master", Scope::Project, None);
        state.stall = true;
        state.prompt_queue.push_back("stuck".into());
        Mutex::new(state)
    }

    #[tokio::test]
    async fn idle_master_is_reset() {
        let state = master();
        let watched = watch(
            &state,
            Duration::from_millis(50),
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(watched, Watched::Expired);
        let state = state.lock().await;
        assert!(!state.stall);
        assert!(state.prompt_queue.is_empty());
    }

    #[tokio::test]
    async fn outstanding_work_keeps_the_call_alive() {
        let state = master();
        state.lock().await.active_children.insert(AgentId::new(), "work".into());

        let watched = watch(&state, Duration::from_millis(30), async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            "FINISH"
        })
        .await;

        assert_eq!(watched, Watched::Done("FINISH"));
        assert!(state.lock().await.stall);
    }

    #[tokio::test]
    async fn fast_call_is_untouched() {
        let state = master();
        let watched = watch(&state, Duration::from_secs(5), async { 7 }).await;
        assert_eq!(watched, Watched::Done(7));
    }

    #[tokio::test]
    async fn oversized_interval_waits_for_the_call() {
        let state = master();
        let watched = watch(&state, Duration::MAX, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            7
        })
        .await;
        assert_eq!(watched, Watched::Done(7));
        assert!(state.lock().await.stall);
    }
}
