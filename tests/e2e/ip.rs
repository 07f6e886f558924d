//! Helpers that inspect kernel state with the `ip` tool

use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Interface name unique to this test process, short enough for IFNAMSIZ.
pub fn unique_name(prefix: &str) -> String {
    let count = NAME_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}{}{}", prefix, std::process::id() % 10000, count)
}

fn ip(args: &[&str]) -> Result<String, String> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .map_err(|e| format!("Failed to run ip: {}", e))?;

    if !output.status.success() {
        return Err(format!(
            "ip {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Snapshot of one link as reported by `ip addr show`.
pub struct Link {
    text: String,
}

impl Link {
    pub fn show(name: &str) -> Option<Self> {
        ip(&["addr", "show", "dev", name]).ok().map(|text| Link { text })
    }

    /// Whether `UP` is among the `<...>` flags of the first line.
    pub fn is_up(&self) -> bool {
        let Some(first) = self.text.lines().next() else {
            return false;
        };
        first
            .split_once('<')
            .and_then(|(_, rest)| rest.split_once('>'))
            .is_some_and(|(flags, _)| flags.split(',').any(|f| f == "UP"))
    }

    pub fn mtu(&self) -> Option<u32> {
        let mut words = self.text.split_whitespace();
        words.find(|w| *w == "mtu")?;
        words.next()?.parse().ok()
    }

    pub fn mac(&self) -> Option<String> {
        let mut words = self.text.split_whitespace();
        words.find(|w| w.starts_with("link/"))?;
        words.next().map(str::to_string)
    }

    pub fn has_address(&self, cidr: &str) -> bool {
        self.text.split_whitespace().any(|w| w == cidr)
    }

    /// IPv4 broadcast; the link-layer `brd` is skipped.
    pub fn broadcast(&self) -> Option<String> {
        let mut words = self.text.split_whitespace().skip_while(|w| *w != "inet");
        words.find(|w| *w == "brd")?;
        words.next().map(str::to_string)
    }
}

/// Reads a counter straight from sysfs.
pub fn kernel_stat(name: &str, stat: &str) -> Option<u64> {
    std::fs::read_to_string(format!("/sys/class/net/{}/statistics/{}", name, stat))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Creates a dummy interface that outlives our handles.
pub fn add_dummy(name: &str) -> Result<(), String> {
    ip(&["link", "add", name, "type", "dummy"]).map(|_| ())
}

pub fn delete_link(name: &str) {
    let _ = ip(&["link", "del", name]);
}
