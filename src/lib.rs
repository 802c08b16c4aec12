pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod format;
pub mod inspector;
pub mod output;
pub mod qido;
pub mod query;
pub mod stow;
pub mod tree;
pub mod tui;
pub mod wado;
