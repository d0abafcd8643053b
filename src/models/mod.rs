// Request and response models for the HTTP API

pub mod user;
