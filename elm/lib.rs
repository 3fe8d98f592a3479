#![deny(dead_code)]
#![deny(unused_imports)]

pub mod archive;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod fit;
pub mod hidden;
pub mod model;
pub mod pipeline;
pub mod visualizer;

pub use error::ElmError;
