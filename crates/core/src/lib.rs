// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-core: Shared wire types for the tether session engine
//!
//! This crate provides the request/response envelopes, the decoded inbound
//! message union, session states and the clock abstraction used by the
//! `tether` session crate and the `tetherctl` command-line client.

pub mod clock;
pub mod error;
pub mod protocol;
pub mod state;

pub use clock::{ClockSource, SystemClock};
pub use error::{Error, Result};
pub use protocol::{
    InboundMessage, Notification, Presence, RequestEnvelope, Response, ServerError, Target,
    TokenValidity,
};
pub use state::SessionState;
