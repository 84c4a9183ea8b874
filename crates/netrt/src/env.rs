use std::env;
use std::sync::OnceLock;

static NETRT_NUM_WORKERS: OnceLock<Option<usize>> = OnceLock::new();
static NETRT_PROFILE: OnceLock<bool> = OnceLock::new();

/// Worker-count override from `NETRT_NUM_WORKERS`, cached after first read.
/// Invalid or empty values fall back to the run configuration.
pub(crate) fn worker_override() -> Option<usize> {
    *NETRT_NUM_WORKERS.get_or_init(|| match env::var("NETRT_NUM_WORKERS") {
        Ok(value) => value.trim().parse::<usize>().ok().filter(|&n| n > 0),
        Err(_) => None,
    })
}

/// Profiling aggregation toggle from `NETRT_PROFILE`. Enabled unless the
/// variable is set to an off value; collection is cheap enough to default on.
pub(crate) fn profile_enabled() -> bool {
    *NETRT_PROFILE.get_or_init(|| match env::var("NETRT_PROFILE") {
        Ok(value) => !matches!(value.trim(), "0" | "false" | "off"),
        Err(_) => true,
    })
}
