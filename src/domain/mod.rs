pub mod calendar;
pub mod input;
pub mod models;
pub mod timer;
