pub mod config;
pub mod factor;
pub mod geometry;
pub mod met;

pub mod errors;
