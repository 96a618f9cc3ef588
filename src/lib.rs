pub mod config;
pub mod depth;
pub mod history;
pub mod models;
pub mod parse;
pub mod poll;
pub mod render;
pub mod sources;
pub mod state;
pub mod stream;
