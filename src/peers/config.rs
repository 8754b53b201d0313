//! `persistent_peers` in the daemon's `config/config.toml`.
//!
//! The daemon config is operator-owned and heavily commented, so it is edited
//! in place with `toml_edit`: only the peer value changes, everything else
//! (comments, ordering, whitespace) is preserved.

use anyhow::{Context, Result, anyhow};
use std::collections::BTreeSet;
use std::path::Path;
use toml_edit::{DocumentMut, Item, value};

use crate::utils::atomic_write;

const PEERS_KEY: &str = "persistent_peers";
const P2P_TABLE: &str = "p2p";

/// Split a comma-separated peer string, dropping blanks.
#[must_use]
pub fn parse_peer_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|p| !p.is_empty()).map(ToString::to_string).collect()
}

/// Order-insensitive view of a peer list.
#[must_use]
pub fn peer_set(peers: &[String]) -> BTreeSet<&str> {
    peers.iter().map(String::as_str).collect()
}

fn load_document(path: &Path) -> Result<DocumentMut> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read node config: {}", path.display()))?;
    content
        .parse::<DocumentMut>()
        .with_context(|| format!("Failed to parse node config: {}", path.display()))
}

/// Where the peer key lives: `[p2p]` first, then the document root.
fn peers_item(doc: &DocumentMut) -> Option<&Item> {
    doc.get(P2P_TABLE)
        .and_then(|p2p| p2p.get(PEERS_KEY))
        .or_else(|| doc.get(PEERS_KEY))
}

/// Peers currently configured at `path`. A missing key means no peers.
pub fn read_peers(path: &Path) -> Result<Vec<String>> {
    let doc = load_document(path)?;
    match peers_item(&doc) {
        None => Ok(Vec::new()),
        Some(item) => {
            let raw = item
                .as_str()
                .ok_or_else(|| anyhow!("{PEERS_KEY} in {} is not a string", path.display()))?;
            Ok(parse_peer_list(raw))
        }
    }
}

/// Replace the configured peers, keeping the rest of the file intact.
///
/// The key is updated where it already lives; a config without one gets it
/// under `[p2p]`.
pub fn write_peers(path: &Path, peers: &[String]) -> Result<()> {
    let mut doc = load_document(path)?;
    let joined = peers.join(",");

    let in_p2p = doc.get(P2P_TABLE).and_then(|p2p| p2p.get(PEERS_KEY)).is_some();
    let at_root = doc.get(PEERS_KEY).is_some();

    if at_root && !in_p2p {
        doc[PEERS_KEY] = value(joined);
    } else {
        let p2p = doc.entry(P2P_TABLE).or_insert_with(toml_edit::table);
        let table = p2p
            .as_table_like_mut()
            .ok_or_else(|| anyhow!("[{P2P_TABLE}] in {} is not a table", path.display()))?;
        match table.get_mut(PEERS_KEY) {
            Some(existing) => {
                // Keep the decor (trailing comments) of the existing value.
                let decor = existing.as_value().map(|v| v.decor().clone());
                *existing = value(joined);
                if let (Some(decor), Some(v)) = (decor, existing.as_value_mut()) {
                    *v.decor_mut() = decor;
                }
            }
            None => {
                table.insert(PEERS_KEY, value(joined));
            }
        }
    }

    atomic_write(path, doc.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"# CometBFT config
moniker = "validator-1"

[p2p]
# Comma separated list of nodes to keep persistent connections to
persistent_peers = "a@1.1.1.1:26656, b@2.2.2.2:26656" # managed
laddr = "tcp://0.0.0.0:26656"
"#;

    #[test]
    fn test_parse_peer_list() {
        assert_eq!(parse_peer_list(" a , b,,c "), vec!["a", "b", "c"]);
        assert!(parse_peer_list("").is_empty());
    }

    #[test]
    fn test_peer_set_ignores_order() {
        let a = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let b = vec!["C".to_string(), "A".to_string(), "B".to_string()];
        assert_eq!(peer_set(&a), peer_set(&b));
    }

    #[test]
    fn test_read_and_write_preserve_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, CONFIG).unwrap();

        assert_eq!(read_peers(&path).unwrap(), vec!["a@1.1.1.1:26656", "b@2.2.2.2:26656"]);

        write_peers(&path, &["c@3.3.3.3:26656".to_string()]).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("# CometBFT config"));
        assert!(written.contains("# Comma separated list"));
        assert!(written.contains("persistent_peers = \"c@3.3.3.3:26656\""));
        assert!(written.contains("laddr = \"tcp://0.0.0.0:26656\""));
        assert_eq!(read_peers(&path).unwrap(), vec!["c@3.3.3.3:26656"]);
    }

    #[test]
    fn test_root_level_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "persistent_peers = \"x\"\n").unwrap();

        assert_eq!(read_peers(&path).unwrap(), vec!["x"]);
        write_peers(&path, &["y".to_string(), "z".to_string()]).unwrap();
        assert_eq!(read_peers(&path).unwrap(), vec!["y", "z"]);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("[p2p]"));
    }

    #[test]
    fn test_missing_key_is_added_under_p2p() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "moniker = \"v\"\n").unwrap();

        assert!(read_peers(&path).unwrap().is_empty());
        write_peers(&path, &["p".to_string()]).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[p2p]"));
        assert_eq!(read_peers(&path).unwrap(), vec!["p"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_peers(&dir.path().join("absent.toml")).is_err());
    }
}
