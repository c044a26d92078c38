//! Common environment variables uses by various components

use once_cell::sync::OnceCell;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_NAME_HTTP_PORT: &str = "HTTP_ENDPOINT_PORT";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
static HTTP_PORT: OnceCell<u16> = OnceCell::new();

pub fn http_port() -> u16 {
    *HTTP_PORT.get_or_init(|| from_env_or(ENV_NAME_HTTP_PORT, DEFAULT_HTTP_PORT))
}

pub const ENV_NAME_MAX_WORKER_COUNT: &str = "MAX_WORKER_COUNT";
static MAX_WORKER_COUNT: OnceCell<usize> = OnceCell::new();

/// Upper bound of workers of a single run. Also used when a request doesn't specify the
/// worker count. Defaults to the available parallelism of the host.
pub fn max_worker_count() -> usize {
    *MAX_WORKER_COUNT.get_or_init(|| {
        let default = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        std::cmp::max(1, from_env_or(ENV_NAME_MAX_WORKER_COUNT, default))
    })
}

pub const ENV_NAME_HTTP_CLIENT_TIMEOUT: &str = "HTTP_CLIENT_TIMEOUT";
pub const DEFAULT_HTTP_CLIENT_TIMEOUT: u64 = 10_000;
static HTTP_CLIENT_TIMEOUT: OnceCell<u64> = OnceCell::new();

/// Timeout of a single upstream request, env value in milliseconds
pub fn http_client_timeout() -> Duration {
    Duration::from_millis(*HTTP_CLIENT_TIMEOUT.get_or_init(|| {
        from_env_or(ENV_NAME_HTTP_CLIENT_TIMEOUT, DEFAULT_HTTP_CLIENT_TIMEOUT)
    }))
}

pub const ENV_NAME_MAX_IDLE_CONNECTION_PER_HOST: &str = "MAX_IDLE_CONNECTION_PER_HOST";
pub const DEFAULT_MAX_IDLE_CONNECTION_PER_HOST: usize = 2048;
static MAX_IDLE_CONNECTION_PER_HOST: OnceCell<usize> = OnceCell::new();

pub fn max_idle_connection_per_host() -> usize {
    *MAX_IDLE_CONNECTION_PER_HOST.get_or_init(|| {
        from_env_or(
            ENV_NAME_MAX_IDLE_CONNECTION_PER_HOST,
            DEFAULT_MAX_IDLE_CONNECTION_PER_HOST,
        )
    })
}

pub const ENV_NAME_ELASTIC_INITIAL_PERMITS: &str = "ELASTIC_INITIAL_PERMITS";
pub const DEFAULT_ELASTIC_INITIAL_PERMITS: usize = 5;

pub fn elastic_initial_permits() -> usize {
    from_env_or(
        ENV_NAME_ELASTIC_INITIAL_PERMITS,
        DEFAULT_ELASTIC_INITIAL_PERMITS,
    )
}

pub const ENV_NAME_ELASTIC_PERMIT_LIMIT: &str = "ELASTIC_PERMIT_LIMIT";
pub const DEFAULT_ELASTIC_PERMIT_LIMIT: usize = 2048;

pub fn elastic_permit_limit() -> usize {
    from_env_or(ENV_NAME_ELASTIC_PERMIT_LIMIT, DEFAULT_ELASTIC_PERMIT_LIMIT)
}

fn from_env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .map_err(|_| ())
        .and_then(|val| T::from_str(val.trim()).map_err(|_| ()))
        .unwrap_or(default)
}
