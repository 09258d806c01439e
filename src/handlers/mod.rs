// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod exam;
pub mod submission;
