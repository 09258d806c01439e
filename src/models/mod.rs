// src/models/mod.rs

pub mod result;
pub mod test;
pub mod user;
