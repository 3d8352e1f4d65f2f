pub mod analyze;
pub mod cohort;
pub mod manifest;
