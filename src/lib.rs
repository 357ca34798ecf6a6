pub mod auth;
pub mod configuration;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod security;
pub mod startup;
pub mod telemetry;
pub mod validators;
