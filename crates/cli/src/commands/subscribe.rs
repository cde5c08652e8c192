// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tether::{RoomEvent, RoomOptions, Session};
use tracing::info;

use super::parse_json;
use crate::cli::{OutputFormat, SubscribeArgs};
use crate::error::{Error, Result};
use crate::output;

pub(crate) fn room_options(args: &SubscribeArgs) -> RoomOptions {
    RoomOptions::default()
        .scope(args.scope.as_str())
        .users(args.users.as_str())
        .subscribe_to_self(!args.skip_self)
}

/// Streams notifications until interrupted or `--limit` is reached.
pub async fn run(session: &Session, args: SubscribeArgs, format: OutputFormat) -> Result<()> {
    let filters = parse_json("--filters", &args.filters)?;
    let mut room = session.subscribe(&args.index, &args.collection, filters, room_options(&args))?;
    let mut received = 0;

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = room.next_event() => event,
        };
        match event {
            Some(RoomEvent::Subscribed { room_id, channel }) => {
                info!(room_id = %room_id, channel = %channel, "listening");
            }
            Some(RoomEvent::Notification(notification)) => {
                println!("{}", output::format_notification(&notification, format));
                received += 1;
                if args.limit.is_some_and(|limit| received >= limit) {
                    break;
                }
            }
            Some(RoomEvent::Failed(e)) => return Err(Error::SubscriptionFailed(e.to_string())),
            None => return Err(Error::SubscriptionEnded),
        }
    }

    room.unsubscribe()?;
    Ok(())
}
