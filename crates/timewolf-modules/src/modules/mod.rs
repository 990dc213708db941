pub mod disk_copy;
pub mod filesystem;
pub mod report_export;
