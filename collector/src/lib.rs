pub mod app;
pub mod checkpoint;
pub mod client;
pub mod emit;
pub mod model;
pub mod secrets;
