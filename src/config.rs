//! Session configuration and stored client settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::{Result, StreamError};

/// Server used when no settings file exists yet
pub const DEFAULT_SERVER: &str = "https://mstdn.jp";

/// Default first reconnect delay
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
/// Default reconnect delay cap
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Default tolerated silence; Mastodon sends a heartbeat comment every 15 seconds
pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(45);
/// Default per-subscriber queue bound
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Bearer credential; never printed in full
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap an access token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Construction-time configuration of a stream session
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Target stream URL
    pub endpoint: Url,
    /// Bearer token
    pub credential: Credential,
    /// First reconnect delay
    pub base_backoff: Duration,
    /// Reconnect delay cap
    pub max_backoff: Duration,
    /// Maximum silence before the connection is presumed dead
    pub liveness_window: Duration,
    /// Per-subscriber queue bound
    pub queue_capacity: usize,
}

impl StreamConfig {
    /// Start building a configuration for `endpoint`
    pub fn builder(endpoint: impl AsRef<str>, credential: Credential) -> StreamConfigBuilder {
        StreamConfigBuilder {
            endpoint: endpoint.as_ref().to_string(),
            credential,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Builder for [`StreamConfig`]
#[derive(Debug, Clone)]
pub struct StreamConfigBuilder {
    endpoint: String,
    credential: Credential,
    base_backoff: Duration,
    max_backoff: Duration,
    liveness_window: Duration,
    queue_capacity: usize,
}

impl StreamConfigBuilder {
    /// First reconnect delay
    pub fn base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = delay;
        self
    }

    /// Reconnect delay cap
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Maximum tolerated silence on a connection
    pub fn liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    /// Per-subscriber queue bound
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<StreamConfig> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| StreamError::invalid_endpoint(&self.endpoint, e.to_string()))?;

        if self.base_backoff.is_zero() {
            return Err(StreamError::config("base backoff must be non-zero"));
        }
        if self.max_backoff < self.base_backoff {
            return Err(StreamError::config("max backoff must not be below base backoff"));
        }
        if self.liveness_window.is_zero() {
            return Err(StreamError::config("liveness window must be non-zero"));
        }
        if self.queue_capacity == 0 {
            return Err(StreamError::config("queue capacity must be at least 1"));
        }

        Ok(StreamConfig {
            endpoint,
            credential: self.credential,
            base_backoff: self.base_backoff,
            max_backoff: self.max_backoff,
            liveness_window: self.liveness_window,
            queue_capacity: self.queue_capacity,
        })
    }
}

/// Streaming timelines offered by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timeline {
    /// Home timeline and notifications of the authenticated user
    User,
    /// Federated public timeline
    Public,
    /// Public timeline of the local instance only
    Local,
    /// Public statuses carrying a hashtag
    Hashtag(String),
    /// Statuses from a list owned by the user
    List(String),
}

impl Timeline {
    /// Resolve the streaming endpoint for this timeline on `server`
    pub fn endpoint(&self, server: &str) -> Result<Url> {
        let mut base = Url::parse(server)
            .map_err(|e| StreamError::invalid_endpoint(server, e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(StreamError::invalid_endpoint(server, "not a base URL"));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let path = match self {
            Timeline::User => "api/v1/streaming/user",
            Timeline::Public => "api/v1/streaming/public",
            Timeline::Local => "api/v1/streaming/public/local",
            Timeline::Hashtag(_) => "api/v1/streaming/hashtag",
            Timeline::List(_) => "api/v1/streaming/list",
        };
        let mut url =
            base.join(path).map_err(|e| StreamError::invalid_endpoint(server, e.to_string()))?;

        match self {
            Timeline::Hashtag(tag) => {
                url.query_pairs_mut().append_pair("tag", tag.trim_start_matches('#'));
            }
            Timeline::List(id) => {
                url.query_pairs_mut().append_pair("list", id);
            }
            _ => {}
        }
        Ok(url)
    }
}

/// Client registration and token stored in `settings.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientSettings {
    pub server: String,
    #[serde(rename = "ClientID")]
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub access_token: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            access_token: String::new(),
        }
    }
}

impl ClientSettings {
    /// `settings.json` under the platform config directory (`~/.config/mstdn` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mstdn").join("settings.json"))
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(StreamError::settings(path, e)),
        };

        serde_json::from_str(&contents).map_err(|e| StreamError::settings(path, e))
    }

    /// Write settings as pretty JSON, creating the parent directory
    ///
    /// The file holds the access token, so on unix the directory is created
    /// `0700` and the file is written `0600`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| StreamError::settings(path, e))?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            create_private_dir(parent).map_err(|e| StreamError::settings(path, e))?;
        }
        write_private_file(path, json.as_bytes()).map_err(|e| StreamError::settings(path, e))?;
        debug!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Whether a token has been stored
    pub fn has_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // `mode` only applies when the file is created
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.sync_all()
}
