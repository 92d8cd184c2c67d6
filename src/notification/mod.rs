//! Offline-alert delivery.

pub mod mailer;

pub use mailer::ResendMailer;
