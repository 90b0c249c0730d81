/// Downloader configuration, read from the environment (and `.env`).
use std::path::PathBuf;

use courier_shared::errors::ConfigError;
use courier_shared::models::Target;

/// URLs fetched when `FETCH_URLS` is not set.
pub const DEFAULT_URLS: &[&str] = &[
    "http://httpbin.org/bytes/1024",
    "http://httpbin.org/bytes/2048",
    "http://httpbin.org/bytes/4096",
    "http://httpbin.org/bytes/8192",
    "http://httpbin.org/bytes/16384",
    "http://httpbin.org/bytes/32768",
    "http://httpbin.org/bytes/65536",
];

pub const DEFAULT_RECV_BUFFER_SIZE: usize = 8192;
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub urls: Vec<String>,
    pub output_dir: PathBuf,
    /// Output files are named `{prefix}_file{n}.bin`.
    pub file_prefix: String,
    /// Bytes requested per receive call.
    pub recv_buffer_size: usize,
    /// Header block limit, 0 for unbounded.
    pub max_header_bytes: usize,
    pub summary_path: Option<PathBuf>,
    /// Abort outstanding downloads on Ctrl-C instead of waiting for them.
    pub cancel_on_ctrl_c: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            urls: DEFAULT_URLS.iter().map(|s| s.to_string()).collect(),
            output_dir: PathBuf::from("./downloads"),
            file_prefix: "tasks".to_string(),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            summary_path: None,
            cancel_on_ctrl_c: true,
        }
    }
}

impl DownloaderConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let urls = match lookup("FETCH_URLS") {
            Some(raw) => {
                let urls: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                if urls.is_empty() {
                    return Err(ConfigError::NoTargets);
                }
                urls
            }
            None => defaults.urls,
        };

        let recv_buffer_size = parse_usize(&lookup, "RECV_BUFFER_SIZE", defaults.recv_buffer_size)?;
        if recv_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                name: "RECV_BUFFER_SIZE",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            urls,
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            file_prefix: lookup("FILE_PREFIX").unwrap_or(defaults.file_prefix),
            recv_buffer_size,
            max_header_bytes: parse_usize(&lookup, "MAX_HEADER_BYTES", defaults.max_header_bytes)?,
            summary_path: lookup("SUMMARY_PATH").map(PathBuf::from),
            cancel_on_ctrl_c: parse_bool(&lookup, "CANCEL_ON_CTRL_C", defaults.cancel_on_ctrl_c)?,
        })
    }

    /// Output path for the `index`-th URL (0-based).
    pub fn output_path(&self, index: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_file{}.bin", self.file_prefix, index + 1))
    }

    /// Turn the configured URLs into download targets.
    ///
    /// A URL that does not parse is a configuration error; nothing is fetched.
    pub fn targets(&self) -> Result<Vec<Target>, ConfigError> {
        self.urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                Target::new(url, self.output_path(i)).map_err(|e| ConfigError::Invalid {
                    name: "FETCH_URLS",
                    value: url.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

fn parse_usize<F>(lookup: &F, name: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: "expected a non-negative integer".to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                value,
                reason: "expected true or false".to_string(),
            }),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.urls.len(), DEFAULT_URLS.len());
        assert_eq!(config.recv_buffer_size, 8192);
        assert_eq!(config.max_header_bytes, 65536);
        assert!(config.summary_path.is_none());
        assert!(config.cancel_on_ctrl_c);
    }

    #[test]
    fn test_bool_values() {
        let config = DownloaderConfig::from_lookup(lookup_from(&[("CANCEL_ON_CTRL_C", "off")])).unwrap();
        assert!(!config.cancel_on_ctrl_c);
        assert!(DownloaderConfig::from_lookup(lookup_from(&[("CANCEL_ON_CTRL_C", "maybe")])).is_err());
    }

    #[test]
    fn test_output_path_naming() {
        let config = DownloaderConfig::from_lookup(lookup_from(&[
            ("OUTPUT_DIR", "/tmp/out"),
            ("FILE_PREFIX", "await"),
        ]))
        .unwrap();
        assert_eq!(config.output_path(0), PathBuf::from("/tmp/out/await_file1.bin"));
        assert_eq!(config.output_path(6), PathBuf::from("/tmp/out/await_file7.bin"));
    }

    #[test]
    fn test_url_override() {
        let config = DownloaderConfig::from_lookup(lookup_from(&[(
            "FETCH_URLS",
            "http://a.test/1, http://b.test/2 ,",
        )]))
        .unwrap();
        assert_eq!(config.urls, vec!["http://a.test/1", "http://b.test/2"]);

        let targets = config.targets().unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[1].output_path.ends_with("tasks_file2.bin"));
    }

    #[test]
    fn test_empty_url_override() {
        let err = DownloaderConfig::from_lookup(lookup_from(&[("FETCH_URLS", " , ")])).unwrap_err();
        assert!(matches!(err, ConfigError::NoTargets));
    }

    #[test]
    fn test_invalid_number() {
        let err = DownloaderConfig::from_lookup(lookup_from(&[("RECV_BUFFER_SIZE", "big")])).unwrap_err();
        assert!(err.to_string().contains("RECV_BUFFER_SIZE"));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        assert!(DownloaderConfig::from_lookup(lookup_from(&[("RECV_BUFFER_SIZE", "0")])).is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = DownloaderConfig::from_lookup(lookup_from(&[("FETCH_URLS", "ftp://x.test/")])).unwrap();
        assert!(config.targets().is_err());
    }
}
