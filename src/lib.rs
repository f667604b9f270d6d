//! blogwrites - write patterns against a relational blog database
//!
//! This library provides the schema, repositories and services behind the
//! `blogwrites` demonstration run: batch inserts, nested creates, a
//! transactional interaction, bulk updates, upserts, raw SQL, concurrent
//! writes and a conditional delete.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod runner;
pub mod services;
