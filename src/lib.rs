//! Step through seed locations and their nearby candidate points, capturing
//! a panorama link for each candidate or marking it unusable.

pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod session;
pub mod store;
pub mod worker;
