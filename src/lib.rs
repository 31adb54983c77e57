//! Site Publisher
//!
//! Admin backend for a statically built site. It loads the site's
//! configuration document from a content repository, lets an operator edit
//! it, publishes it back with optimistic concurrency and watches the build
//! pipeline the publish triggers.

pub mod build;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod model;
pub mod remote;
pub mod routes;
pub mod state;
pub mod sync;
