//! Server configuration.
//!
//! DESIGN
//! ======
//! Everything tunable comes from environment variables with conservative
//! defaults, parsed once at startup into a `Config` that rides inside
//! `AppState`. `Default` carries the documented defaults; `from_env`
//! layers the environment on top.

use std::path::PathBuf;

const DEFAULT_WS_PORT: u16 = 8080;
const DEFAULT_HTTP_PORT: u16 = 8081;
const DEFAULT_DATA_DIR: &str = "saved_boards";
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;
const DEFAULT_REPLAY_SOFT_CAP: usize = 10_000;
const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;
const DEFAULT_MAX_PARTICIPANTS: usize = 50;

/// Parse an environment variable, falling back to `default` when the
/// variable is unset or unparsable.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the raw WebSocket session listener.
    pub ws_port: u16,
    /// Port for the axum HTTP control plane.
    pub http_port: u16,
    /// Base directory for boards, images and timelapses.
    pub data_dir: PathBuf,
    /// SQLite connection string for the credential store.
    pub database_url: String,
    /// Bound on each connection's outbound queue; overflow closes it.
    pub outbound_queue_capacity: usize,
    /// Soft cap on a room's replay log; oldest entries are evicted past it.
    pub replay_soft_cap: usize,
    /// Largest inbound frame payload accepted before failing the connection.
    pub max_frame_len: usize,
    /// Seats per room.
    pub max_participants: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        let database_url = default_database_url(&data_dir);
        Self {
            ws_port: DEFAULT_WS_PORT,
            http_port: DEFAULT_HTTP_PORT,
            data_dir,
            database_url,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            replay_soft_cap: DEFAULT_REPLAY_SOFT_CAP,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
        }
    }
}

fn default_database_url(data_dir: &std::path::Path) -> String {
    format!("sqlite:{}/users.db?mode=rwc", data_dir.display())
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| default_database_url(&data_dir));

        Self {
            ws_port: env_parse("WS_PORT", DEFAULT_WS_PORT),
            http_port: env_parse("HTTP_PORT", DEFAULT_HTTP_PORT),
            data_dir,
            database_url,
            outbound_queue_capacity: env_parse(
                "OUTBOUND_QUEUE_CAPACITY",
                DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            ),
            replay_soft_cap: env_parse("REPLAY_SOFT_CAP", DEFAULT_REPLAY_SOFT_CAP),
            max_frame_len: env_parse("MAX_FRAME_LEN", DEFAULT_MAX_FRAME_LEN),
            max_participants: env_parse("MAX_PARTICIPANTS", DEFAULT_MAX_PARTICIPANTS),
        }
    }

    /// Directory for uploaded images, served under `/images/`.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    /// Directory for rendered timelapse videos.
    #[must_use]
    pub fn timelapse_dir(&self) -> PathBuf {
        self.data_dir.join("timelapses")
    }
}
