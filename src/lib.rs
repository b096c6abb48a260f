pub mod airr;
pub mod app;
pub mod config;
pub mod container;
pub mod datasets;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod http;
pub mod iedb;
pub mod locus;
pub mod output;
pub mod store;
pub mod table;
pub mod vdjdb;
