pub mod delay;
pub mod eq;
pub mod graph;
pub mod limiter;
pub mod output;
pub mod reverb;
pub mod writer;
