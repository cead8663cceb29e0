use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Consecutive block responses after which a host session is discarded.
pub const BLOCKS_BEFORE_RESET: u32 = 2;

#[derive(Debug)]
struct HostSession {
    cookies: BTreeMap<String, String>,
    consecutive_blocks: u32,
    created_at: Instant,
    seeded: bool,
}

impl HostSession {
    fn fresh() -> Self {
        Self {
            cookies: BTreeMap::new(),
            consecutive_blocks: 0,
            created_at: Instant::now(),
            seeded: false,
        }
    }
}

/// Per-host cookie jars with block-driven and age-driven invalidation.
///
/// All mutation happens after a request completes, so a cancelled request
/// never leaves a half-written session behind.
#[derive(Debug)]
pub struct SessionTable {
    ttl: Duration,
    hosts: Mutex<HashMap<String, HostSession>>,
}

impl SessionTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// `cookie` header value for `host`, or `None` without cookies.
    pub fn cookie_header(&self, host: &str) -> Option<String> {
        let mut hosts = self.hosts.lock().expect("session table lock is not poisoned");
        self.expire(&mut hosts, host);
        let session = hosts.get(host)?;
        if session.cookies.is_empty() {
            return None;
        }

        Some(
            session
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Whether `host` has no live seeded session.
    pub fn needs_seed(&self, host: &str) -> bool {
        let mut hosts = self.hosts.lock().expect("session table lock is not poisoned");
        self.expire(&mut hosts, host);
        hosts.get(host).map_or(true, |session| !session.seeded)
    }

    pub fn mark_seeded(&self, host: &str, set_cookies: &[String]) {
        let mut hosts = self.hosts.lock().expect("session table lock is not poisoned");
        let session = hosts
            .entry(host.to_owned())
            .or_insert_with(HostSession::fresh);
        session.seeded = true;
        merge_cookies(&mut session.cookies, set_cookies);
    }

    pub fn record_success(&self, host: &str, set_cookies: &[String]) {
        let mut hosts = self.hosts.lock().expect("session table lock is not poisoned");
        let session = hosts
            .entry(host.to_owned())
            .or_insert_with(HostSession::fresh);
        session.consecutive_blocks = 0;
        merge_cookies(&mut session.cookies, set_cookies);
    }

    /// Returns `true` when the block discarded the session.
    pub fn record_block(&self, host: &str) -> bool {
        let mut hosts = self.hosts.lock().expect("session table lock is not poisoned");
        let Some(session) = hosts.get_mut(host) else {
            return false;
        };

        session.consecutive_blocks = session.consecutive_blocks.saturating_add(1);
        if session.consecutive_blocks >= BLOCKS_BEFORE_RESET {
            hosts.remove(host);
            return true;
        }
        false
    }

    #[cfg(test)]
    fn has_session(&self, host: &str) -> bool {
        let mut hosts = self.hosts.lock().expect("session table lock is not poisoned");
        self.expire(&mut hosts, host);
        hosts.contains_key(host)
    }

    fn expire(&self, hosts: &mut HashMap<String, HostSession>, host: &str) {
        let expired = hosts
            .get(host)
            .is_some_and(|session| session.created_at.elapsed() >= self.ttl);
        if expired {
            hosts.remove(host);
        }
    }
}

fn merge_cookies(jar: &mut BTreeMap<String, String>, set_cookies: &[String]) {
    for header in set_cookies {
        let pair = header.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        jar.insert(name.to_owned(), value.trim().to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_cookies_are_replayed() {
        let table = SessionTable::new(Duration::from_secs(600));
        assert!(table.needs_seed("www.nseindia.com"));

        table.mark_seeded(
            "www.nseindia.com",
            &[
                String::from("nsit=abc; Path=/; HttpOnly"),
                String::from("bm_sv=xyz; Max-Age=7200"),
            ],
        );

        assert!(!table.needs_seed("www.nseindia.com"));
        assert_eq!(
            table.cookie_header("www.nseindia.com").as_deref(),
            Some("bm_sv=xyz; nsit=abc")
        );
    }

    #[test]
    fn two_consecutive_blocks_discard_session() {
        let table = SessionTable::new(Duration::from_secs(600));
        table.mark_seeded("h", &[String::from("a=1")]);

        assert!(!table.record_block("h"));
        assert!(table.record_block("h"));
        assert!(table.needs_seed("h"));
        assert_eq!(table.cookie_header("h"), None);
    }

    #[test]
    fn success_resets_block_streak() {
        let table = SessionTable::new(Duration::from_secs(600));
        table.mark_seeded("h", &[]);
        assert!(!table.record_block("h"));
        table.record_success("h", &[String::from("b=2")]);
        assert!(!table.record_block("h"));
        assert!(table.has_session("h"));
    }

    #[test]
    fn sessions_expire_after_ttl() {
        let table = SessionTable::new(Duration::from_millis(1));
        table.mark_seeded("h", &[String::from("a=1")]);
        std::thread::sleep(Duration::from_millis(3));
        assert!(table.needs_seed("h"));
    }
}
