pub mod backend;
pub mod chrome;
pub mod console;
pub mod errors;
pub mod registry;
pub mod render;
pub mod serialize;
pub mod theme;
pub mod types;
pub mod web;
