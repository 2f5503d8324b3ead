pub mod booking;
pub mod events;
pub mod holds;
pub mod lifecycle;
