pub mod callback;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod messaging;
pub mod models;
pub mod normalize;
pub mod routes;
pub mod routing;
pub mod store;
