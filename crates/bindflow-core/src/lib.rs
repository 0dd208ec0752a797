pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod model;
pub mod poscar;
pub mod workdir;
