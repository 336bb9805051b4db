pub mod api;
pub mod clients;
pub mod config;
pub mod humanize;
pub mod ledger;
pub mod model;
pub mod observability;
pub mod queue;
pub mod service;
pub mod storage;
pub mod worker;
