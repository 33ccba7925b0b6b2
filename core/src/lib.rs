pub mod dashboard;
pub mod db;
pub mod export;
pub mod insights;
pub mod models;
pub mod service;
pub mod sync;
