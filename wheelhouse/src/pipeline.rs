// wheelhouse/src/pipeline.rs
pub mod runner;
