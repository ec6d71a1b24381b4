pub mod ccs;
pub mod cli;
pub mod workqueue;
