pub mod auth;
pub mod common;
pub mod data;
pub mod params;
pub mod pipeline;
pub mod report;
pub mod semesters;
pub mod tds;
