pub mod booking;
pub mod lifecycle;

pub use booking::{AppointmentBookingService, StatusChange};
pub use lifecycle::{AppointmentLifecycleService, Transition};
