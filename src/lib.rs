//! cortile is a small community publishing service: registered users write
//! posts, optionally file them into groups, comment on each other's work, and
//! follow authors to build a personal feed.
//!
//! The crate is layered the same way the binary consumes it: `domain` holds
//! entities and validation, `application` the services and repository traits,
//! `infra` the Postgres/HTTP/filesystem adapters, `presentation` the askama
//! views, and `cache` the TTL-bounded response cache for the global feed.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
