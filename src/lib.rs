pub mod app;
pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod form;
pub mod models;
pub mod pages;
pub mod poll_scheduler;
pub mod poller;
pub mod routes;
pub mod session;
pub mod settings;
pub mod summary;
pub mod worker_processing;
