use crate::models::{AppointmentStatus, BookingError};

/// The appointment state machine. Every status write in this cell goes
/// through `validate_status_transition` so illegal edges (completing a
/// cancelled visit, restarting a completed one) are impossible to persist.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn get_valid_transitions(from: AppointmentStatus) -> &'static [AppointmentStatus] {
        match from {
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::Started,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
                AppointmentStatus::PendingPatientDecision,
            ],
            AppointmentStatus::Started => {
                &[AppointmentStatus::Completed, AppointmentStatus::Cancelled]
            }
            AppointmentStatus::PendingPatientDecision => {
                &[AppointmentStatus::Rescheduled, AppointmentStatus::Cancelled]
            }
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::Rescheduled => &[],
        }
    }

    pub fn validate_status_transition(
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<(), BookingError> {
        if Self::get_valid_transitions(from).contains(&to) {
            Ok(())
        } else {
            Err(BookingError::InvalidStatusTransition { from, to })
        }
    }
}
