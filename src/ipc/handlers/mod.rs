pub mod attendance;
pub mod classes;
pub mod core;
pub mod dashboard;
pub mod grades;
pub mod payments;
pub mod schedules;
pub mod students;
pub mod teachers;
pub mod years;
