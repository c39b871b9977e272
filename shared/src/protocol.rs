/// DNS-SD meta-query that enumerates every service type on the link
pub const SERVICE_TYPE_QUERY: &str = "_services._dns-sd._udp.local.";

/// TXT record key carrying the URL path of a service
pub const TXT_PATH: &str = "path";

/// Scheme used when building service URLs
pub const DEFAULT_URL_SCHEME: &str = "http";

/// Per-record report files are named `<prefix><key>.json`
pub const REPORT_FILE_PREFIX: &str = "zeroconf_";
pub const REPORT_FILE_EXTENSION: &str = "json";

/// Default discovery window in seconds
pub const DEFAULT_WINDOW_SECS: u64 = 15;
