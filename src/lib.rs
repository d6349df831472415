pub mod app;
pub mod audio;
pub mod camera;
pub mod classifier;
pub mod config;
pub mod core;
pub mod gesture;
pub mod model;
