pub mod ai;
pub mod calendar;
pub mod dispatch;
pub mod messaging;
