// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Chef repository synchronization.
//!
//! A __chef repository__ is a local directory tree mirroring the object
//! namespace of a remote chef store: clients, cookbooks, data bags,
//! environments, nodes, roles, and users. Both sides are exposed as uniform
//! tree views over one logical namespace, e.g., `/roles/web.json` or
//! `/cookbooks/apache2/recipes/default.rb`, so they can be listed, diffed,
//! uploaded, downloaded, and deleted the same way.
//!
//! # Layout
//!
//! - [`config`] and [`overlay`] map the logical namespace onto one or more
//!   root directories per top-level directory.
//! - [`chefignore`] hides cookbook content through chefignore files.
//! - [`address`] and [`handler`] give every logical path its object kind and
//!   JSON rules.
//! - [`tree`] implements the local and remote tree views.
//! - [`diff`], [`sync`], and [`list`] are the operations.
//!
//! # See Also
//!
//! 1. [Chef Infra - knife](https://docs.chef.io/workstation/knife/)

pub mod address;
pub mod chefignore;
pub mod config;
pub mod cookbook;
pub mod diff;
pub mod handler;
pub mod list;
pub mod overlay;
pub mod path;
pub mod pattern;
pub mod report;
pub mod store;
pub mod sync;
pub mod tree;
