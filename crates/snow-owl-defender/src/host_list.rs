//! Safe and block lists
//!
//! NIST 800-53: AC-3 (Access Enforcement), SC-7 (Boundary Protection)
//! Implementation: Immutable membership test over exact addresses and CIDR
//! networks, loaded once from a JSON file
//!
//! List file format:
//!
//! ```json
//! { "addresses": ["192.168.1.1", "2001:db8::1"], "networks": ["10.8.0.0/24"] }
//! ```

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{DefenderError, Result};

/// Larger list files are rejected before parsing
const MAX_LIST_FILE_SIZE: u64 = 20 * 1024 * 1024;

/// Parse an address reported by a protocol handler
///
/// IPv4-mapped IPv6 addresses are folded to IPv4. Anything that is not an IP
/// literal yields `None`.
pub fn parse_address(address: &str) -> Option<IpAddr> {
    address
        .trim()
        .parse::<IpAddr>()
        .ok()
        .map(|ip| ip.to_canonical())
}

/// On-disk representation of a host list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostListFile {
    /// Literal IPv4/IPv6 addresses
    pub addresses: Vec<String>,
    /// CIDR networks
    pub networks: Vec<String>,
}

/// Binary prefix trie over one address family
///
/// Each inserted network marks the node reached after walking its prefix
/// bits. A lookup succeeds on the first marked node along the address path,
/// so the cost is bounded by the address width, not the number of networks.
#[derive(Debug, Default)]
struct PrefixTrie {
    root: TrieNode,
    len: usize,
}

#[derive(Debug, Default)]
struct TrieNode {
    terminal: bool,
    children: [Option<Box<TrieNode>>; 2],
}

impl PrefixTrie {
    /// `key` holds the prefix left-aligned in a u128
    fn insert(&mut self, key: u128, prefix_len: u8) {
        let mut node = &mut self.root;
        for depth in 0..prefix_len {
            if node.terminal {
                // a shorter network already covers this one
                return;
            }
            let bit = bit_at(key, depth);
            node = &mut **node.children[bit].get_or_insert_with(Box::default);
        }
        if !node.terminal {
            let nested: usize = node.children.iter().flatten().map(|c| c.terminals()).sum();
            node.terminal = true;
            node.children = [None, None];
            self.len = self.len + 1 - nested;
        }
    }

    fn contains(&self, key: u128, width: u8) -> bool {
        let mut node = &self.root;
        for depth in 0..width {
            if node.terminal {
                return true;
            }
            match &node.children[bit_at(key, depth)] {
                Some(child) => node = &**child,
                None => return false,
            }
        }
        node.terminal
    }
}

impl TrieNode {
    fn terminals(&self) -> usize {
        if self.terminal {
            return 1;
        }
        self.children.iter().flatten().map(|c| c.terminals()).sum()
    }
}

fn bit_at(key: u128, depth: u8) -> usize {
    ((key >> (127 - u32::from(depth))) & 1) as usize
}

fn trie_key(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)) << 96,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Membership test over exact addresses and CIDR networks
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct HostList {
    addresses: HashSet<IpAddr>,
    v4_networks: PrefixTrie,
    v6_networks: PrefixTrie,
}

impl HostList {
    /// Build a list from already parsed addresses and networks
    pub fn new(
        addresses: impl IntoIterator<Item = IpAddr>,
        networks: impl IntoIterator<Item = IpNet>,
    ) -> Self {
        let mut list = Self {
            addresses: addresses.into_iter().map(|ip| ip.to_canonical()).collect(),
            ..Default::default()
        };
        for network in networks {
            list.insert_network(network);
        }
        list
    }

    fn insert_network(&mut self, network: IpNet) {
        let network = network.trunc();
        match network {
            IpNet::V4(_) => self
                .v4_networks
                .insert(trie_key(network.network()), network.prefix_len()),
            IpNet::V6(_) => self
                .v6_networks
                .insert(trie_key(network.network()), network.prefix_len()),
        }
    }

    /// Check whether an address string is listed
    ///
    /// Malformed input is never listed.
    pub fn is_listed(&self, address: &str) -> bool {
        parse_address(address).is_some_and(|ip| self.contains(ip))
    }

    /// Check whether a parsed address is listed
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        if self.addresses.contains(&ip) {
            return true;
        }
        match ip {
            IpAddr::V4(_) => self.v4_networks.contains(trie_key(ip), 32),
            IpAddr::V6(_) => self.v6_networks.contains(trie_key(ip), 128),
        }
    }

    /// Number of exact addresses
    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }

    /// Number of distinct networks, not counting networks nested in another
    pub fn network_count(&self) -> usize {
        self.v4_networks.len + self.v6_networks.len
    }

    /// Build a list from the on-disk representation, dropping invalid entries
    pub fn from_file_contents(contents: &HostListFile, source: &Path) -> Self {
        let mut list = Self::default();

        for address in &contents.addresses {
            match parse_address(address) {
                Some(ip) => {
                    list.addresses.insert(ip);
                }
                None => warn!(
                    event = "host_list_entry_dropped",
                    file = %source.display(),
                    address = %address,
                    "Ignoring invalid IP address in host list"
                ),
            }
        }

        for network in &contents.networks {
            match network.trim().parse::<IpNet>() {
                Ok(net) => list.insert_network(net),
                Err(e) => warn!(
                    event = "host_list_entry_dropped",
                    file = %source.display(),
                    network = %network,
                    error = %e,
                    "Ignoring invalid network in host list"
                ),
            }
        }

        list
    }
}

/// Load a host list from a JSON file
///
/// Returns `Ok(None)` when the file declares no addresses and no networks.
/// A file whose entries are all invalid still yields an (empty) list.
///
/// # Errors
///
/// `ListLoadIo` if the file cannot be read, `ListLoadParse` if it is not
/// valid JSON
pub fn load_host_list(path: &Path) -> Result<Option<HostList>> {
    let io_err = |source: std::io::Error| DefenderError::ListLoadIo {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(io_err)?;
    if metadata.is_dir() {
        return Err(io_err(std::io::Error::new(
            ErrorKind::InvalidInput,
            "host list path is a directory",
        )));
    }
    if metadata.len() > MAX_LIST_FILE_SIZE {
        return Err(io_err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("host list file too big: {} bytes", metadata.len()),
        )));
    }

    let content = std::fs::read(path).map_err(io_err)?;
    let contents: HostListFile =
        serde_json::from_slice(&content).map_err(|source| DefenderError::ListLoadParse {
            path: path.to_path_buf(),
            source,
        })?;

    if contents.addresses.is_empty() && contents.networks.is_empty() {
        debug!(
            event = "host_list_empty",
            file = %path.display(),
            "Host list declares no entries"
        );
        return Ok(None);
    }

    let list = HostList::from_file_contents(&contents, path);
    debug!(
        event = "host_list_loaded",
        file = %path.display(),
        addresses = list.address_count(),
        networks = list.network_count(),
        "Host list loaded"
    );

    Ok(Some(list))
}
