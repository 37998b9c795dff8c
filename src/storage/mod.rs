//! Storage module - Durable block store

pub mod db;

pub use db::*;
