pub mod appointment;
pub mod credential;
pub mod intent;

pub use appointment::{Appointment, AppointmentStatus, NewAppointment};
pub use credential::CredentialToken;
pub use intent::{Action, Intent};
