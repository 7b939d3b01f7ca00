use crate::api::v1alpha1::{CassandraStatus, ClusterPhase, ConditionStatus, ConditionType};
use crate::util::status::{find_status_condition, is_status_condition_true, set_status_condition};

// Condition reasons
pub const REASON_AVAILABLE: &str = "Cluster available";
pub const REASON_SCALING_DOWN: &str = "Scaling down";
pub const REASON_DECOMMISSIONED: &str = "Decommissioned";
pub const REASON_DECOMMISSION_FAILED: &str = "DecommissionFailed";
pub const REASON_SCALING_COMPLETE: &str = "ScalingComplete";

/// Message recorded on the Scaling condition for a one-member decrease.
pub fn scaling_message(desired: i32, observed: i32) -> String {
    format!("from={desired},to={observed}")
}

impl CassandraStatus {
    pub fn set_phase(&mut self, phase: ClusterPhase) {
        self.phase = Some(phase);
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    pub fn clear_reason(&mut self) {
        self.reason = None;
    }

    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) -> bool {
        set_status_condition(&mut self.conditions, type_, status, reason, message)
    }

    pub fn set_available_condition(&mut self) -> bool {
        self.set_condition(
            ConditionType::Available,
            ConditionStatus::True,
            REASON_AVAILABLE,
            "",
        )
    }

    pub fn set_scaling_down_condition(&mut self, desired: i32, observed: i32) -> bool {
        self.set_condition(
            ConditionType::Scaling,
            ConditionStatus::True,
            REASON_SCALING_DOWN,
            &scaling_message(desired, observed),
        )
    }

    /// The member was decommissioned; the replica decrease is now allowed.
    pub fn set_decommissioned_condition(&mut self, desired: i32, observed: i32) -> bool {
        self.set_condition(
            ConditionType::Scaling,
            ConditionStatus::True,
            REASON_DECOMMISSIONED,
            &scaling_message(desired, observed),
        )
    }

    pub fn set_decommission_failed_condition(&mut self, message: &str) -> bool {
        self.set_condition(
            ConditionType::Scaling,
            ConditionStatus::False,
            REASON_DECOMMISSION_FAILED,
            message,
        )
    }

    pub fn set_scaling_complete_condition(&mut self) -> bool {
        self.set_condition(
            ConditionType::Scaling,
            ConditionStatus::False,
            REASON_SCALING_COMPLETE,
            "",
        )
    }

    pub fn is_scaling(&self) -> bool {
        is_status_condition_true(&self.conditions, ConditionType::Scaling)
    }

    /// True when the member for the `desired`/`observed` pair was already decommissioned
    /// and only the replica decrease is outstanding.
    pub fn is_decommissioned(&self, desired: i32, observed: i32) -> bool {
        find_status_condition(&self.conditions, ConditionType::Scaling)
            .map(|c| {
                c.status == ConditionStatus::True
                    && c.reason == REASON_DECOMMISSIONED
                    && c.message == scaling_message(desired, observed)
            })
            .unwrap_or(false)
    }

    /// The desired size recorded by a still-open Decommissioned condition.
    pub fn decommissioned_size(&self) -> Option<i32> {
        find_status_condition(&self.conditions, ConditionType::Scaling)
            .filter(|c| c.status == ConditionStatus::True && c.reason == REASON_DECOMMISSIONED)
            .and_then(|c| c.message.strip_prefix("from="))
            .and_then(|rest| rest.split(',').next())
            .and_then(|desired| desired.parse().ok())
    }

    pub fn is_failed(&self) -> bool {
        self.phase == Some(ClusterPhase::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_is_overwritten_not_latched() {
        let mut status = CassandraStatus::default();
        status.set_phase(ClusterPhase::Failed);
        status.set_reason("boom");
        assert!(status.is_failed());

        status.set_phase(ClusterPhase::Running);
        status.clear_reason();
        assert_eq!(status.phase, Some(ClusterPhase::Running));
        assert_eq!(status.reason, None);
    }

    #[test]
    fn available_condition_upsert_is_idempotent() {
        let mut status = CassandraStatus::default();
        assert!(status.set_available_condition());
        let before = status.clone();

        assert!(!status.set_available_condition());
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status, before);
    }

    #[test]
    fn decommissioned_size_reads_the_open_condition() {
        let mut status = CassandraStatus::default();
        assert_eq!(status.decommissioned_size(), None);

        status.set_scaling_down_condition(2, 3);
        assert_eq!(status.decommissioned_size(), None);

        status.set_decommissioned_condition(2, 3);
        assert_eq!(status.decommissioned_size(), Some(2));

        status.set_scaling_complete_condition();
        assert_eq!(status.decommissioned_size(), None);
    }

    #[test]
    fn decommissioned_only_matches_same_transition() {
        let mut status = CassandraStatus::default();
        status.set_scaling_down_condition(2, 3);
        assert!(status.is_scaling());
        assert!(!status.is_decommissioned(2, 3));

        status.set_decommissioned_condition(2, 3);
        assert!(status.is_scaling());
        assert!(status.is_decommissioned(2, 3));
        assert!(!status.is_decommissioned(1, 2));

        status.set_scaling_complete_condition();
        assert!(!status.is_scaling());
        assert!(!status.is_decommissioned(2, 3));
    }
}
