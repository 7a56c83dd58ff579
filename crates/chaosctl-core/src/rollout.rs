//! Rollout confirmation
//!
//! Follows label-selected pods until one reports the Running phase. The
//! wait is bounded by a deadline and can be cancelled from outside.

use crate::types::RolloutState;
use chaos_rs::{ClusterApi, PodPhase};
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;

/// Watch errors in a row before the rollout is reported as failed
const MAX_CONSECUTIVE_WATCH_ERRORS: u32 = 3;

pub struct RolloutWatcher<'a> {
    cluster: &'a dyn ClusterApi,
    timeout: Duration,
}

impl<'a> RolloutWatcher<'a> {
    pub fn new(cluster: &'a dyn ClusterApi, timeout: Duration) -> Self {
        Self { cluster, timeout }
    }

    /// Block until a pod matching `label` in `namespace` is Running
    ///
    /// Returns `TimedOut` when the deadline passes, `Cancelled` when `cancel`
    /// resolves first, and `Failed` if the watch ends or keeps erroring.
    /// Isolated watch errors are logged and the watch continues.
    pub async fn watch_until_running<C>(
        &self,
        namespace: &str,
        label: &str,
        cancel: C,
    ) -> RolloutState
    where
        C: Future<Output = ()>,
    {
        let mut events = match self.cluster.watch_pods_by_label(namespace, label).await {
            Ok(stream) => stream,
            Err(e) => {
                return RolloutState::Failed {
                    reason: format!("could not open pod watch: {}", e),
                };
            }
        };

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        tokio::pin!(cancel);

        let mut last_phase: Option<PodPhase> = None;
        let mut errors_in_a_row = 0;
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::warn!(namespace, label, last_phase = ?last_phase, "Rollout deadline reached");
                    return RolloutState::TimedOut { after: self.timeout };
                }
                _ = &mut cancel => {
                    tracing::info!(namespace, label, "Rollout watch cancelled");
                    return RolloutState::Cancelled;
                }
                event = events.next() => match event {
                    Some(Ok(pod)) => {
                        errors_in_a_row = 0;
                        tracing::debug!(pod = %pod.name, phase = %pod.phase, "Pod event");
                        last_phase = Some(pod.phase);
                        match pod.phase {
                            PodPhase::Running => {
                                tracing::info!(pod = %pod.name, "Agent pod is running");
                                return RolloutState::Running { pod: pod.name };
                            }
                            // A failed pod may be replaced; keep waiting
                            PodPhase::Failed => {
                                tracing::warn!(pod = %pod.name, "Agent pod failed, waiting for a replacement");
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        errors_in_a_row += 1;
                        if errors_in_a_row >= MAX_CONSECUTIVE_WATCH_ERRORS {
                            return RolloutState::Failed { reason: e.to_string() };
                        }
                        tracing::warn!(namespace, label, error = %e, errors_in_a_row, "Pod watch error, retrying");
                    }
                    None => {
                        return RolloutState::Failed {
                            reason: "pod watch closed before the agent was running".to_string(),
                        };
                    }
                },
            }
        }
    }
}
