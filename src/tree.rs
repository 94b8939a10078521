//! Channel tree construction from the flat lists the query interface returns.

use std::collections::HashSet;

use crate::models::{Channel, ChannelRecord, Client, ClientRecord};

/// Parent id of top-level channels.
pub const ROOT_PARENT_ID: u64 = 0;

/// Nesting limit for the built tree. Channels below it are dropped.
pub const MAX_CHANNEL_DEPTH: usize = 64;

/// Build the channel forest below `parent_id`, preserving input order.
///
/// Channels whose parent does not exist are never reached from the root and
/// are left out. Each channel id is placed at most once: the first record
/// reached wins, so duplicate ids and parent cycles terminate. Query clients
/// are dropped.
pub fn build_tree(
    channels: &[ChannelRecord],
    clients: &[ClientRecord],
    parent_id: u64,
) -> Vec<Channel> {
    let mut placed = HashSet::from([parent_id]);
    build_level(channels, clients, parent_id, 1, &mut placed)
}

fn build_level(
    channels: &[ChannelRecord],
    clients: &[ClientRecord],
    parent_id: u64,
    depth: usize,
    placed: &mut HashSet<u64>,
) -> Vec<Channel> {
    if depth > MAX_CHANNEL_DEPTH {
        return Vec::new();
    }

    let mut level = Vec::new();
    for ch in channels.iter().filter(|ch| ch.parent_id == parent_id) {
        if !placed.insert(ch.id) {
            continue;
        }
        level.push(Channel {
            id: ch.id,
            name: ch.name.clone(),
            parent_id: ch.parent_id,
            clients: clients_in_channel(clients, ch.id),
            children: build_level(channels, clients, ch.id, depth + 1, placed),
        });
    }
    level
}

fn clients_in_channel(clients: &[ClientRecord], channel_id: u64) -> Vec<Client> {
    clients
        .iter()
        .filter(|c| !c.is_query_client() && c.channel_id == channel_id)
        .map(Client::from)
        .collect()
}

/// Total clients across the whole forest.
pub fn count_clients(channels: &[Channel]) -> usize {
    channels
        .iter()
        .map(|ch| ch.clients.len() + count_clients(&ch.children))
        .sum()
}

/// Total channel nodes across the whole forest.
pub fn count_channels(channels: &[Channel]) -> usize {
    channels
        .iter()
        .map(|ch| 1 + count_channels(&ch.children))
        .sum()
}
