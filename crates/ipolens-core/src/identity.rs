use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ValidationError;

/// Browser user agents rotated by default.
pub const DEFAULT_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
];

/// One request persona: a user agent plus the headers a browser would send with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub id: String,
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
}

impl ClientIdentity {
    pub fn browser(id: impl Into<String>, user_agent: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            String::from("accept"),
            String::from("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            String::from("accept-language"),
            String::from("en-US,en;q=0.9"),
        );
        headers.insert(String::from("connection"), String::from("keep-alive"));

        Self {
            id: id.into(),
            user_agent: user_agent.into(),
            headers,
        }
    }
}

/// Rotating identity pool with a per-target cooldown table.
///
/// An identity that was blocked by a target is not handed out again for that
/// target until `cooldown` elapses, unless every identity is cooling down; then
/// the one blocked longest ago is reused.
#[derive(Debug)]
pub struct IdentityPool {
    identities: Vec<ClientIdentity>,
    cooldown: Duration,
    blocked: Mutex<HashMap<(String, String), Instant>>,
}

impl IdentityPool {
    pub fn new(identities: Vec<ClientIdentity>, cooldown: Duration) -> Result<Self, ValidationError> {
        if identities.is_empty() {
            return Err(ValidationError::EmptyIdentityPool);
        }

        Ok(Self {
            identities,
            cooldown,
            blocked: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_user_agents<I, S>(user_agents: I, cooldown: Duration) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identities = user_agents
            .into_iter()
            .enumerate()
            .map(|(index, agent)| ClientIdentity::browser(format!("browser-{}", index + 1), agent))
            .collect();
        Self::new(identities, cooldown)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Pick an identity for `target`, skipping those cooling down there.
    pub fn select(&self, target: &str) -> ClientIdentity {
        let mut blocked = self
            .blocked
            .lock()
            .expect("identity cooldown lock is not poisoned");
        let now = Instant::now();
        blocked.retain(|_, at| now.duration_since(*at) < self.cooldown);

        let available: Vec<&ClientIdentity> = self
            .identities
            .iter()
            .filter(|identity| !blocked.contains_key(&key(target, &identity.id)))
            .collect();

        if !available.is_empty() {
            return available[fastrand::usize(..available.len())].clone();
        }

        self.identities
            .iter()
            .min_by_key(|identity| blocked.get(&key(target, &identity.id)).copied())
            .unwrap_or(&self.identities[0])
            .clone()
    }

    pub fn record_block(&self, target: &str, identity_id: &str) {
        let mut blocked = self
            .blocked
            .lock()
            .expect("identity cooldown lock is not poisoned");
        blocked.insert(key(target, identity_id), Instant::now());
    }

    pub fn is_cooling_down(&self, target: &str, identity_id: &str) -> bool {
        let blocked = self
            .blocked
            .lock()
            .expect("identity cooldown lock is not poisoned");
        blocked
            .get(&key(target, identity_id))
            .is_some_and(|at| at.elapsed() < self.cooldown)
    }

    /// Identity ids currently cooling down for `target`, sorted.
    pub fn cooling_down(&self, target: &str) -> Vec<String> {
        let blocked = self
            .blocked
            .lock()
            .expect("identity cooldown lock is not poisoned");
        let mut ids: Vec<String> = blocked
            .iter()
            .filter(|((blocked_target, _), at)| {
                blocked_target == target && at.elapsed() < self.cooldown
            })
            .map(|((_, id), _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        let identities = DEFAULT_USER_AGENTS
            .iter()
            .enumerate()
            .map(|(index, agent)| ClientIdentity::browser(format!("browser-{}", index + 1), *agent))
            .collect();
        Self {
            identities,
            cooldown: Duration::from_secs(300),
            blocked: Mutex::new(HashMap::new()),
        }
    }
}

fn key(target: &str, identity_id: &str) -> (String, String) {
    (target.to_owned(), identity_id.to_owned())
}
