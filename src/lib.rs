pub mod actions;
pub mod archive;
pub mod commands;
pub mod download;
pub mod fetch;
pub mod generate;
pub mod http;
pub mod index;
pub mod labels;
pub mod license;
pub mod model;
pub mod plan;
pub mod process;
pub mod runtime;
pub mod vcs;
