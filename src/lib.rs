// lib.rs
pub mod assembly;
pub mod config;
pub mod controller;
pub mod error;
pub mod evaluate;
pub mod events;
pub mod mapping;
pub mod partition;
pub mod pipeline;
pub mod reads;
pub mod reconstitute;
pub mod regions;
pub mod tools;
