//! Upgrade/drain state machine: a generation-tracked sequence of
//! transitions over a `Deployment` record, each rejecting transitions out
//! of the wrong source state instead of silently overwriting it. A thin
//! wrapper holds the record by value, with one method per named transition,
//! each matching on the current state and returning a typed error on
//! mismatch.

use crate::error::{RegistryError, Result};
use sari_model::{Deployment, DeploymentState};

pub struct DeploymentStateMachine {
    deployment: Deployment,
}

impl DeploymentStateMachine {
    pub fn new(deployment: Deployment) -> Self {
        DeploymentStateMachine { deployment }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn into_deployment(self) -> Deployment {
        self.deployment
    }

    fn require(&self, expected: DeploymentState, attempted: &'static str) -> Result<()> {
        if self.deployment.state == expected {
            Ok(())
        } else {
            Err(RegistryError::InvalidTransition {
                from: state_name(self.deployment.state),
                attempted,
            })
        }
    }

    /// `idle -> starting`: a candidate daemon has been launched for the
    /// next generation.
    pub fn begin_deploy(&mut self, candidate_boot_id: &str) -> Result<()> {
        self.require(DeploymentState::Idle, "starting")?;
        self.deployment.generation += 1;
        self.deployment.candidate_boot_id = Some(candidate_boot_id.to_string());
        self.deployment.state = DeploymentState::Starting;
        self.deployment.health_fail_streak = 0;
        Ok(())
    }

    /// `starting -> ready`: the candidate was probed healthy.
    pub fn mark_ready(&mut self) -> Result<()> {
        self.require(DeploymentState::Starting, "ready")?;
        self.deployment.state = DeploymentState::Ready;
        Ok(())
    }

    /// `starting -> idle`: the candidate never became healthy; abort.
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<()> {
        self.require(DeploymentState::Starting, "idle (abort)")?;
        self.deployment.candidate_boot_id = None;
        self.deployment.rollback_reason = Some(reason.into());
        self.deployment.state = DeploymentState::Idle;
        Ok(())
    }

    /// `ready -> switched`, idempotent under a matching generation:
    /// workspace bindings have been rewritten to the candidate and the
    /// prior active daemon marked draining. Calling this again for the
    /// same generation is a no-op; a mismatched generation is ignored
    /// entirely, which is what makes concurrent deployers safe.
    pub fn switch_active(&mut self, generation: u64) -> Result<()> {
        if generation != self.deployment.generation {
            return Ok(());
        }
        if self.deployment.state == DeploymentState::Switched {
            return Ok(());
        }
        self.require(DeploymentState::Ready, "switched")?;
        self.deployment.active_boot_id = self.deployment.candidate_boot_id.take();
        self.deployment.state = DeploymentState::Switched;
        Ok(())
    }

    /// `switched -> idle`: rollback cleanup has completed for this
    /// generation, restoring the prior active binding.
    pub fn rollback_active(&mut self, prior_active_boot_id: Option<String>, reason: impl Into<String>) -> Result<()> {
        self.require(DeploymentState::Switched, "idle (rollback)")?;
        self.deployment.active_boot_id = prior_active_boot_id;
        self.deployment.candidate_boot_id = None;
        self.deployment.rollback_reason = Some(reason.into());
        self.deployment.state = DeploymentState::Idle;
        Ok(())
    }

    /// Increments the candidate's consecutive health-check failure streak;
    /// callers decide the failure threshold that triggers `abort`.
    pub fn record_health_failure(&mut self) -> u32 {
        self.deployment.health_fail_streak += 1;
        self.deployment.health_fail_streak
    }
}

fn state_name(state: DeploymentState) -> &'static str {
    match state {
        DeploymentState::Idle => "idle",
        DeploymentState::Starting => "starting",
        DeploymentState::Ready => "ready",
        DeploymentState::Switched => "switched",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_idle_to_switched_to_idle() {
        let mut sm = DeploymentStateMachine::new(Deployment::default());
        sm.begin_deploy("candidate-1").unwrap();
        assert_eq!(sm.deployment().generation, 1);

        sm.mark_ready().unwrap();
        sm.switch_active(1).unwrap();
        assert_eq!(sm.deployment().active_boot_id.as_deref(), Some("candidate-1"));

        sm.rollback_active(Some("prior".into()), "upgrade complete, cleanup")
            .unwrap();
        assert_eq!(sm.deployment().state, DeploymentState::Idle);
        assert_eq!(sm.deployment().active_boot_id.as_deref(), Some("prior"));
    }

    #[test]
    fn abort_returns_to_idle_from_starting() {
        let mut sm = DeploymentStateMachine::new(Deployment::default());
        sm.begin_deploy("candidate-1").unwrap();
        sm.abort("candidate never became healthy").unwrap();
        assert_eq!(sm.deployment().state, DeploymentState::Idle);
        assert!(sm.deployment().candidate_boot_id.is_none());
    }

    #[test]
    fn switch_active_is_idempotent_for_matching_generation() {
        let mut sm = DeploymentStateMachine::new(Deployment::default());
        sm.begin_deploy("candidate-1").unwrap();
        sm.mark_ready().unwrap();
        sm.switch_active(1).unwrap();
        sm.switch_active(1).unwrap();
        assert_eq!(sm.deployment().state, DeploymentState::Switched);
    }

    #[test]
    fn switch_active_ignores_mismatched_generation() {
        let mut sm = DeploymentStateMachine::new(Deployment::default());
        sm.begin_deploy("candidate-1").unwrap();
        sm.mark_ready().unwrap();
        sm.switch_active(99).unwrap();
        assert_eq!(sm.deployment().state, DeploymentState::Ready);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut sm = DeploymentStateMachine::new(Deployment::default());
        let err = sm.mark_ready().unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));
    }

    #[test]
    fn health_failure_streak_increments() {
        let mut sm = DeploymentStateMachine::new(Deployment::default());
        assert_eq!(sm.record_health_failure(), 1);
        assert_eq!(sm.record_health_failure(), 2);
    }
}
