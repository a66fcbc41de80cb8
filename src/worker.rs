//! The worker loop proper: dequeue
//! a client, read exactly one request, dispatch it under the storage
//! lock, and report back to the master.

use std::sync::Arc;

use crate::client::ClientId;
use crate::context::Context;
use crate::dispatch::{client_cleanup, handle_request};
use crate::notify::{notify_disconnected, notify_idle};
use crate::sync::Queue;
use crate::wire::read_packet;

/// Run the dispatch loop for one worker thread until the master->workers
/// queue closes.
pub fn run(ctx: Arc<Context>, to_workers: Queue<ClientId>) {
    while let Some(client) = to_workers.get() {
        serve_one(&ctx, client);
    }
}

fn serve_one(ctx: &Context, client: ClientId) {
    let Some(conn) = ctx.registry.get(client) else {
        return;
    };

    let mut reader = &*conn;
    let packet = match read_packet(&mut reader) {
        Ok(packet) => packet,
        Err(_) => {
            client_cleanup(ctx, client);
            ctx.registry.remove(client);
            drop(conn);
            notify_disconnected(ctx.notify_write, client);
            return;
        }
    };

    if handle_request(ctx, client, packet) {
        notify_idle(ctx.notify_write, client);
    }
    // else: the request parked `client` in a blob's lock-wait queue;
    // its fd is reactivated later by whichever worker eventually
    // unlocks or destroys that blob.
}
