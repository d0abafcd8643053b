// ICE Backend - Library root for testing

pub mod config;
pub mod error;
pub mod auth;
pub mod db;
pub mod models;
pub mod routes;
pub mod middleware;
