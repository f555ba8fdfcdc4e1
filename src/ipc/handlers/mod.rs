pub mod attendance;
pub mod backup;
pub mod core;
pub mod grades;
pub mod grid;
pub mod groups;
pub mod reports;
pub mod schedule;
pub mod taker;
