// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Collection handles: requests and subscriptions scoped to one collection.

use std::fmt;
use std::sync::Weak;

use serde_json::Value;
use tether_core::Target;

use crate::config::QueryOptions;
use crate::error::Result;
use crate::request::ResponseFuture;
use crate::room::{Room, RoomOptions};
use crate::session::{upgrade, Shared};

/// A collection within an index.
#[derive(Clone)]
pub struct Collection {
    session: Weak<Shared>,
    index: String,
    name: String,
}

impl Collection {
    pub(crate) fn new(session: Weak<Shared>, index: String, name: String) -> Self {
        Collection { session, index, name }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target for `controller:action` on this collection.
    pub fn target(&self, controller: &str, action: &str) -> Target {
        Target::new(controller, action)
            .with_index(self.index.clone())
            .with_collection(self.name.clone())
    }

    pub fn query(
        &self,
        controller: &str,
        action: &str,
        body: Value,
        options: QueryOptions,
    ) -> Result<ResponseFuture> {
        upgrade(&self.session)?.query(self.target(controller, action), body, options)
    }

    /// Subscribes to documents of this collection matching `filters`.
    pub fn subscribe(&self, filters: Value, options: RoomOptions) -> Result<Room> {
        upgrade(&self.session)?.subscribe(&self.index, &self.name, filters, options)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection").field("index", &self.index).field("name", &self.name).finish()
    }
}

#[cfg(test)]
#[path = "collection_tests.rs"]
mod tests;
