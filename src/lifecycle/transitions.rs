use crate::error::AppError;
use crate::models::ride::RideStatus;

/// Allowed next statuses for each current status. Terminal statuses have no
/// outgoing transitions.
pub fn allowed(from: RideStatus) -> &'static [RideStatus] {
    use RideStatus::*;

    match from {
        Requested => &[Searching, Accepted, Cancelled],
        Searching => &[Accepted, Cancelled],
        Accepted => &[Arriving, Cancelled],
        Arriving => &[InProgress, Cancelled],
        InProgress => &[Completed, Cancelled],
        Completed | Cancelled => &[],
    }
}

pub fn ensure_allowed(from: RideStatus, to: RideStatus) -> Result<(), AppError> {
    if allowed(from).contains(&to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}
