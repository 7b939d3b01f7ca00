use chrono::Utc;

use crate::api::v1alpha1::{ClusterCondition, ConditionStatus, ConditionType};

/// Sets the condition of the given type and returns whether the list changed.
///
/// 1. If a condition of that type exists with the same status, reason and message,
///    nothing is touched (timestamps included).
/// 2. If it exists but differs, the whole entry is replaced in place and both
///    timestamps are set to now.
/// 3. Otherwise a new condition is appended with both timestamps set to now.
pub fn set_status_condition(
    conditions: &mut Vec<ClusterCondition>,
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) -> bool {
    let now = Utc::now();

    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status == status && existing.reason == reason && existing.message == message {
                return false;
            }
            existing.last_transition_time = now;
            existing.status = status;
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.last_update_time = now;
        }
        None => conditions.push(ClusterCondition {
            type_,
            status,
            last_update_time: now,
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
        }),
    }
    true
}

/// Finds the condition_type in conditions.
pub fn find_status_condition(
    conditions: &[ClusterCondition],
    condition_type: ConditionType,
) -> Option<&ClusterCondition> {
    conditions.iter().find(|c| c.type_ == condition_type)
}

/// Returns true when the condition_type is present and set to `True`
pub fn is_status_condition_true(conditions: &[ClusterCondition], condition_type: ConditionType) -> bool {
    find_status_condition(conditions, condition_type)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false)
}
