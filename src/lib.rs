pub mod admin;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod flows;
pub mod frontdesk;
pub mod limits;
pub mod mail;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod remote;
pub mod services;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;
