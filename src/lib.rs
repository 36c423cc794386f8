pub mod app;
pub mod config;
pub mod construct;
pub mod deploy;
pub mod iam;
pub mod nag;
pub mod resources;
pub mod stacks;
pub mod synth;
pub mod writer;
