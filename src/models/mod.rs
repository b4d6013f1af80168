pub mod calendar;
pub mod session;
