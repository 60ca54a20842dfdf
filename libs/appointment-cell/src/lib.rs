pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentStatus, AppointmentSummary,
    AppointmentValidationRules, TimeInterval,
};
pub use router::appointment_routes;
pub use services::*;
