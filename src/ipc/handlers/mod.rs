pub mod accounts;
pub mod boundaries;
pub mod classes;
pub mod core;
pub mod grades;
pub mod students;
