//! Learning metrics for a school portal: latest values and chart-ready
//! trends per metric type, plus activity summaries, for one student in one
//! class.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod models;
pub mod report;
pub mod source;
