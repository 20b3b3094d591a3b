pub mod academic_years;
pub mod admin;
pub mod backup;
pub mod classes;
pub mod core;
pub mod database;
pub mod payment_types;
pub mod payments;
pub mod reports;
pub mod school_info;
pub mod students;
