use std::time::Duration;

/// Ceiling on the connect timeout, seconds. Requests never wait longer
/// than this to establish a connection, whatever the caller asks for.
pub const MAX_CONNECT_TIMEOUT: f64 = 3.1;

/// Ceiling on the read timeout, seconds (90 minutes).
pub const MAX_READ_TIMEOUT: f64 = 90.0 * 60.0;

/// Production archive server.
pub const DEFAULT_URL: &str = "https://astroarchive.noirlab.edu";

const DEFAULT_CONNECT_TIMEOUT: f64 = 3.05;
const DEFAULT_READ_TIMEOUT: f64 = 5.0 * 60.0;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the archive server.
    pub url: String,

    /// Log server tracebacks from failed requests.
    pub verbose: bool,

    /// Seconds to wait to establish a connection with the server.
    pub connect_timeout: f64,

    /// Seconds to wait for the server to start sending a response.
    pub read_timeout: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            verbose: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn connect_timeout(mut self, seconds: f64) -> Self {
        self.connect_timeout = seconds;
        self
    }

    pub fn read_timeout(mut self, seconds: f64) -> Self {
        self.read_timeout = seconds;
        self
    }

    /// API root derived from the configured base URL.
    pub fn api_url(&self) -> String {
        format!("{}/api", self.url.trim_end_matches('/'))
    }

    /// The `(connect, read)` timeout pair actually used on the wire,
    /// clamped to [`MAX_CONNECT_TIMEOUT`] and [`MAX_READ_TIMEOUT`].
    pub fn effective_timeouts(&self) -> (Duration, Duration) {
        (
            Duration::from_secs_f64(self.connect_timeout.clamp(0.0, MAX_CONNECT_TIMEOUT)),
            Duration::from_secs_f64(self.read_timeout.clamp(0.0, MAX_READ_TIMEOUT)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_clamped_to_ceilings() {
        let config = Config::default().connect_timeout(10.0).read_timeout(10000.0);
        let (connect, read) = config.effective_timeouts();
        assert_eq!(connect, Duration::from_secs_f64(3.1));
        assert_eq!(read, Duration::from_secs_f64(5400.0));
    }

    #[test]
    fn test_timeouts_below_ceilings_pass_through() {
        let config = Config::default().connect_timeout(1.1).read_timeout(60.0);
        let (connect, read) = config.effective_timeouts();
        assert_eq!(connect, Duration::from_secs_f64(1.1));
        assert_eq!(read, Duration::from_secs_f64(60.0));
    }

    #[test]
    fn test_api_url_strips_trailing_slash() {
        let config = Config::new("http://localhost:8010/");
        assert_eq!(config.api_url(), "http://localhost:8010/api");
    }

    #[test]
    fn test_api_url_default() {
        let config = Config::default();
        assert_eq!(config.api_url(), "https://astroarchive.noirlab.edu/api");
    }
}
