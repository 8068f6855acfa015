pub mod api;
pub mod config;
pub mod db;
pub mod ensemble;
pub mod error;
pub mod evaluation;
pub mod explain;
pub mod models;
pub mod narrator;
pub mod report;
pub mod scanner;
