//! qBittorrent adapter.

pub mod client;

pub use client::QBittorrentClient;
