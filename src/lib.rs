pub mod app;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod fs_util;
pub mod ledger;
pub mod monitor;
pub mod output;
pub mod scores;
pub mod splitter;
pub mod store;
pub mod timing;
