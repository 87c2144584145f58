pub mod capture;
pub mod models;
