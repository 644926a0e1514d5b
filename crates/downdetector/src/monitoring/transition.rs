use crate::storage::models::ServiceStatus;

/// Whether a fresh observation differs from the previously known status
///
/// `Unknown -> x` counts: the first observation after registration (or after
/// a restart that lost history) is announced.
pub fn is_transition(previous: ServiceStatus, current: ServiceStatus) -> bool {
    previous != current
}
