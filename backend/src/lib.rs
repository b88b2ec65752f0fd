pub mod booking;
pub mod config;
pub mod db;
pub mod engine;
pub mod event;
pub mod metrics;
pub mod notification;
pub mod reservation;
pub mod scheduler;
pub mod user;

pub mod clock;
pub mod error;
pub mod logger;
