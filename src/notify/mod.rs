//! Deal alerts: threshold gate, message formatting and delivery.

pub mod email;
pub mod gate;

pub use email::{Notifier, SmtpNotifier};
pub use gate::{format_alert, should_notify, DealSnapshot, NotificationGate};
