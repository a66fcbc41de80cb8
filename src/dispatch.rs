//! The request handler: protocol dispatch, the per-opcode
//! open/lock state-machine transitions, and eviction-on-overflow. Every
//! handler below runs under a single storage-lock acquisition, matching
//! "the entire request executes under this lock."

use crate::client::ClientId;
use crate::context::Context;
use crate::error::{fatal, ErrorCode};
use crate::notify::notify_idle as wake_idle;
use crate::storage::Blob;
use crate::wire::{write_packet, OpenFlags, Packet};

fn send_to(ctx: &Context, client: ClientId, packet: &Packet) {
    let Some(conn) = ctx.registry.get(client) else {
        return;
    };
    let mut writer = &*conn;
    if write_packet(&mut writer, packet, ctx.compression).is_err() {
        log::debug!("write to {client} failed; treating as disconnected for the rest of this request");
    }
}

/// A victim's wait-queue members are always woken with `FILE_DOES_NOT_EXIST`
/// and returned to the master's idle set, independent of whether the
/// victim's bytes are also streamed back to the requester.
fn dispose_victim(ctx: &Context, victim: Blob) {
    for waiter in victim.lock_wait_queue {
        send_to(ctx, waiter, &Packet::Error(ErrorCode::FileDoesNotExist));
        wake_idle(ctx.notify_write, waiter);
    }
}

/// The writer/appender eviction path: the victim is
/// streamed back to the requesting client as `FILE_P` before its waiters
/// are failed.
fn deliver_evicted(ctx: &Context, client: ClientId, victim: Blob) {
    send_to(
        ctx,
        client,
        &Packet::FileP {
            name: victim.name.clone(),
            data: victim.bytes.clone(),
        },
    );
    dispose_victim(ctx, victim);
}

/// Dispatch one request. Returns whether `client`'s fd should be handed
/// back to the master's idle set: false
/// only when `LOCK_FILE` parked the client in a blob's wait queue
/// without replying.
pub fn handle_request(ctx: &Context, client: ClientId, packet: Packet) -> bool {
    match packet {
        Packet::OpenFile { name, flags } => {
            open_file(ctx, client, &name, flags);
            true
        }
        Packet::CloseFile(name) => {
            close_file(ctx, client, &name);
            true
        }
        Packet::ReadFile(name) => {
            read_file(ctx, client, &name);
            true
        }
        Packet::ReadNFiles(count) => {
            read_n_files(ctx, client, count);
            true
        }
        Packet::WriteFile { name, data } => {
            write_file(ctx, client, &name, data);
            true
        }
        Packet::AppendFile { name, data } => {
            append_file(ctx, client, &name, data);
            true
        }
        Packet::LockFile(name) => lock_file(ctx, client, &name),
        Packet::UnlockFile(name) => {
            unlock_file(ctx, client, &name);
            true
        }
        Packet::RemoveFile(name) => {
            remove_file(ctx, client, &name);
            true
        }
        other => fatal(&format!("unexpected request opcode reached the dispatcher: {other:?}")),
    }
}

/// Unlock transition shared by `UNLOCK_FILE`, `CLOSE_FILE`'s implicit
/// unlock, and client-disconnect cleanup. Precondition:
/// `blob.locked_by == Some(client)`. Returns the new holder, if the wait
/// queue handed the lock off to someone.
fn transfer_lock(blob: &mut Blob, client: ClientId) -> Option<ClientId> {
    debug_assert_eq!(blob.locked_by, Some(client));
    match blob.lock_wait_queue.pop_front() {
        Some(next) => {
            blob.locked_by = Some(next);
            Some(next)
        }
        None => {
            blob.locked_by = None;
            None
        }
    }
}

fn open_file(ctx: &Context, client: ClientId, name: &[u8], flags: OpenFlags) {
    let create = flags.contains(OpenFlags::CREATE);
    let want_lock = flags.contains(OpenFlags::LOCK);
    let mut storage = ctx.storage.write();

    let exists = storage.contains(name);
    if create && exists {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileAlreadyExists));
    }
    if !create && !exists {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileDoesNotExist));
    }
    if want_lock && !create {
        let blob = storage.find(name).expect("checked exists above");
        if blob.locked_by.is_some() {
            return send_to(ctx, client, &Packet::Error(ErrorCode::FileAlreadyLocked));
        }
    }

    if create {
        if let Some(victim) = storage.evict_one_for_slot() {
            dispose_victim(ctx, victim);
        }
        storage.insert_new(name.to_vec());
    }

    let blob = storage.find_mut(name).expect("blob must exist by now");
    blob.open_for(client);
    if want_lock {
        blob.locked_by = Some(client);
    }
    send_to(ctx, client, &Packet::Comp);
}

fn read_file(ctx: &Context, client: ClientId, name: &[u8]) {
    let storage = ctx.storage.read();
    let Some(blob) = storage.find(name) else {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileDoesNotExist));
    };
    if let Some(holder) = blob.locked_by {
        if holder != client {
            return send_to(
                ctx,
                client,
                &Packet::Error(ErrorCode::FileIsLockedByAnotherClient),
            );
        }
    }
    let tick = storage.tick();
    blob.touch(tick);
    send_to(ctx, client, &Packet::Data(blob.bytes.clone()));
}

fn read_n_files(ctx: &Context, client: ClientId, count: u64) {
    let storage = ctx.storage.read();
    let total = storage.num_blobs();
    let all = count == 0 || count == u64::MAX;
    let n = if all {
        total
    } else {
        (count as usize).min(total)
    };
    send_to(ctx, client, &Packet::FileSequence(n as u64));
    let names: Vec<Vec<u8>> = storage.names_in_order().take(n).cloned().collect();
    for name in names {
        let blob = storage.find(&name).expect("name came from current snapshot");
        send_to(
            ctx,
            client,
            &Packet::FileP {
                name: blob.name.clone(),
                data: blob.bytes.clone(),
            },
        );
    }
    send_to(ctx, client, &Packet::Comp);
}

fn write_file(ctx: &Context, client: ClientId, name: &[u8], data: Vec<u8>) {
    let mut storage = ctx.storage.write();
    if !storage.contains(name) {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileDoesNotExist));
    }
    let blob = storage.find(name).expect("checked exists above");
    if blob.size() != 0 {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileWasAlreadyWritten));
    }
    if blob.locked_by != Some(client) {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileIsNotLocked));
    }
    if data.len() as u64 > storage.max_bytes() {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileIsTooBig));
    }

    let outcome = match storage.evict_until_fits(data.len() as u64, Some(name)) {
        Ok(outcome) => outcome,
        Err(code) => return send_to(ctx, client, &Packet::Error(code)),
    };
    for victim in outcome.victims {
        deliver_evicted(ctx, client, victim);
    }
    storage.set_bytes(name, data);
    send_to(ctx, client, &Packet::Comp);
}

fn append_file(ctx: &Context, client: ClientId, name: &[u8], data: Vec<u8>) {
    let mut storage = ctx.storage.write();
    let Some(blob) = storage.find(name) else {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileDoesNotExist));
    };
    if let Some(holder) = blob.locked_by {
        if holder != client {
            return send_to(
                ctx,
                client,
                &Packet::Error(ErrorCode::FileIsLockedByAnotherClient),
            );
        }
    }
    let old_size = blob.size() as u64;
    if old_size + data.len() as u64 > storage.max_bytes() {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileIsTooBig));
    }

    let outcome = match storage.evict_until_fits(data.len() as u64, Some(name)) {
        Ok(outcome) => outcome,
        Err(code) => return send_to(ctx, client, &Packet::Error(code)),
    };
    for victim in outcome.victims {
        deliver_evicted(ctx, client, victim);
    }
    storage.append_bytes(name, data);
    send_to(ctx, client, &Packet::Comp);
}

fn lock_file(ctx: &Context, client: ClientId, name: &[u8]) -> bool {
    let mut storage = ctx.storage.write();
    let Some(blob) = storage.find_mut(name) else {
        send_to(ctx, client, &Packet::Error(ErrorCode::FileDoesNotExist));
        return true;
    };
    if blob.locked_by == Some(client) {
        send_to(ctx, client, &Packet::Error(ErrorCode::FileAlreadyLocked));
        return true;
    }
    if blob.locked_by.is_none() {
        blob.locked_by = Some(client);
        send_to(ctx, client, &Packet::Comp);
        return true;
    }
    blob.lock_wait_queue.push_back(client);
    false
}

fn unlock_file(ctx: &Context, client: ClientId, name: &[u8]) {
    let mut storage = ctx.storage.write();
    let Some(blob) = storage.find_mut(name) else {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileDoesNotExist));
    };
    if blob.locked_by != Some(client) {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileIsNotLocked));
    }
    let handed_to = transfer_lock(blob, client);
    send_to(ctx, client, &Packet::Comp);
    if let Some(next) = handed_to {
        send_to(ctx, next, &Packet::Comp);
        wake_idle(ctx.notify_write, next);
    }
}

fn close_file(ctx: &Context, client: ClientId, name: &[u8]) {
    let mut storage = ctx.storage.write();
    let Some(blob) = storage.find_mut(name) else {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileDoesNotExist));
    };
    if !blob.close_for(client) {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileIsNotOpened));
    }
    let handed_to = if blob.locked_by == Some(client) {
        transfer_lock(blob, client)
    } else {
        None
    };
    send_to(ctx, client, &Packet::Comp);
    if let Some(next) = handed_to {
        send_to(ctx, next, &Packet::Comp);
        wake_idle(ctx.notify_write, next);
    }
}

fn remove_file(ctx: &Context, client: ClientId, name: &[u8]) {
    let mut storage = ctx.storage.write();
    let Some(blob) = storage.find(name) else {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileDoesNotExist));
    };
    if let Some(holder) = blob.locked_by {
        if holder != client {
            return send_to(
                ctx,
                client,
                &Packet::Error(ErrorCode::FileIsLockedByAnotherClient),
            );
        }
    }
    if !blob.is_opened_by(client) {
        return send_to(ctx, client, &Packet::Error(ErrorCode::FileIsNotOpened));
    }
    let victim = storage.remove(name).expect("checked exists above");
    dispose_victim(ctx, victim);
    send_to(ctx, client, &Packet::Comp);
}

/// Disconnect cleanup: a
/// client may appear in any number of blobs' open-sets or wait-queues, so
/// every blob must be scanned. Run under the storage write lock; the
/// deferred-reply notifications it returns are sent after release.
pub fn client_cleanup(ctx: &Context, client: ClientId) {
    let mut storage = ctx.storage.write();
    let mut handed_to = Vec::new();
    for blob in storage.blobs_mut() {
        if blob.locked_by == Some(client) {
            if let Some(next) = transfer_lock(blob, client) {
                handed_to.push((next, blob.name.clone()));
            }
        }
        blob.close_for(client);
        blob.remove_waiter(client);
    }
    drop(storage);

    for (next, _name) in handed_to {
        send_to(ctx, next, &Packet::Comp);
        wake_idle(ctx.notify_write, next);
    }
}
