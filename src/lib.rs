pub mod ci;
pub mod cli;
pub mod daemon;
pub mod errors;
pub mod exports;
pub mod id;
pub mod models;
pub mod server;
pub mod storage;
