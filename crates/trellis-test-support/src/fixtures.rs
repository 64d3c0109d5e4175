//! Sample requests, profiles and snapshots for bridge tests.

use std::time::Duration;

use trellis_config::BridgeConfig;
use trellis_core::{
    AddTorrentFile, AddTorrentLink, FileSnapshot, PeerSnapshot, Priority, Server, TorrentId,
    TorrentSnapshot, TorrentStatus,
};

/// Magnet link for a small public-domain sample.
pub const MAGNET_LINK: &str = "magnet:?xt=urn:btih:c9e15763f722f23e98a29decdfae341b98d53056\
&dn=Cosmos+Laundromat&tr=udp%3A%2F%2Ftracker.example.org%3A6969";

/// Info hash carried by [`MAGNET_LINK`].
pub const MAGNET_HASH: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

/// Address the in-memory engine refuses to connect to.
pub const UNREACHABLE_ADDRESS: &str = "daemon.invalid";

/// Bridge configuration tuned for tests: short poll interval, small bus.
#[must_use]
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        poll_interval_ms: 20,
        event_bus_capacity: 256,
        thread_name: "trellis-test-worker".to_string(),
        ..BridgeConfig::default()
    }
}

/// Loopback profile whose periodic updates effectively never fire on their own.
#[must_use]
pub fn loopback_server() -> Server {
    Server {
        name: "loopback".to_string(),
        address: "127.0.0.1".to_string(),
        port: 9091,
        api_path: "/transmission/rpc".to_string(),
        https: false,
        self_signed_certificate: None,
        client_certificate: None,
        credentials: None,
        update_interval: Duration::from_secs(3_600),
        timeout: Duration::from_secs(5),
    }
}

/// Magnet add request for a synthetic 40-character hash built from `seed`.
#[must_use]
pub fn magnet_request(seed: char, name: &str) -> AddTorrentLink {
    let hash: String = std::iter::repeat_n(seed, 40).collect();
    AddTorrentLink {
        link: format!("magnet:?xt=urn:btih:{hash}&dn={name}"),
        start: true,
        ..AddTorrentLink::default()
    }
}

/// Minimal single-file bencoded metainfo.
#[must_use]
pub fn metainfo_bytes(name: &str, length: u64) -> Vec<u8> {
    format!(
        "d8:announce30:udp://tracker.example.org:69694:infod6:lengthi{length}e4:name{}:{name}12:piece lengthi16384eee",
        name.len()
    )
    .into_bytes()
}

/// Add request wrapping [`metainfo_bytes`].
#[must_use]
pub fn metainfo_request(name: &str, length: u64) -> AddTorrentFile {
    AddTorrentFile {
        metainfo: metainfo_bytes(name, length),
        start: false,
        ..AddTorrentFile::default()
    }
}

/// Paused torrent snapshot with the given id.
#[must_use]
pub fn sample_torrent(id: i32) -> TorrentSnapshot {
    let mut torrent = TorrentSnapshot::new(
        TorrentId(id),
        format!("{id:040x}"),
        format!("sample-{id}"),
    );
    torrent.status = TorrentStatus::Paused;
    torrent.total_size = 1_048_576;
    torrent.size_when_done = 1_048_576;
    torrent.left_until_done = 1_048_576;
    torrent
}

/// Wanted file snapshot at position `index`.
#[must_use]
pub fn sample_file(index: u32) -> FileSnapshot {
    FileSnapshot {
        index,
        path: format!("sample/file-{index}.bin"),
        size: 4_096,
        completed_size: 0,
        wanted: true,
        priority: Priority::Normal,
    }
}

/// Peer snapshot with a documentation-range address.
#[must_use]
pub fn sample_peer(last_octet: u8) -> PeerSnapshot {
    PeerSnapshot {
        address: format!("203.0.113.{last_octet}:51413"),
        client: "Transmission 4.0.5".to_string(),
        progress: 0.25,
        ..PeerSnapshot::default()
    }
}
