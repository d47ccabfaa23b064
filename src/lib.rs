pub mod color;
pub mod config;
pub mod dsl;
pub mod error;
pub mod noise;
pub mod protocol;
pub mod raster;
pub mod sandbox;
