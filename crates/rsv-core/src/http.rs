use std::env;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use tracing::debug;

const USER_AGENT: &str = concat!("rsv/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
pub(crate) const SEND_ATTEMPTS: usize = 3;

/// Whether standard proxy environment variables should be honored.
///
/// `RSV_KEEP_PROXIES=1/true/yes/on` enables them; anything else, or unset,
/// talks to endpoints directly.
fn keep_proxies() -> bool {
    env::var("RSV_KEEP_PROXIES").is_ok_and(|raw| {
        matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

pub(crate) fn build_http_client() -> Result<Client> {
    let builder = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT);
    let builder = if keep_proxies() {
        builder
    } else {
        builder.no_proxy()
    };
    builder.build().context("failed to build HTTP client")
}

/// Send a request, rebuilding and retrying it when the transport fails.
///
/// HTTP error statuses are returned to the caller untouched.
pub(crate) fn send_with_retry<F>(label: &str, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;
    for attempt in 1..=SEND_ATTEMPTS {
        match build().send() {
            Ok(response) => return Ok(response),
            Err(err) => {
                debug!("{label}: attempt {attempt}/{SEND_ATTEMPTS} failed: {err}");
                last_err = Some(err);
                if attempt < SEND_ATTEMPTS {
                    thread::sleep(Duration::from_millis(250 * attempt as u64));
                }
            }
        }
    }
    match last_err {
        Some(err) => Err(err).with_context(|| format!("{label}: request failed")),
        None => Err(anyhow!("{label}: no attempts made")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn proxies_are_opt_in() {
        env::remove_var("RSV_KEEP_PROXIES");
        assert!(!keep_proxies());
        env::set_var("RSV_KEEP_PROXIES", " Yes ");
        assert!(keep_proxies());
        env::set_var("RSV_KEEP_PROXIES", "0");
        assert!(!keep_proxies());
        env::remove_var("RSV_KEEP_PROXIES");
    }

    #[test]
    #[serial]
    fn retry_gives_up_after_transport_failures() -> Result<()> {
        let client = build_http_client()?;
        let err = send_with_retry("unreachable", || client.get("http://127.0.0.1:9/"))
            .expect_err("nothing listens on the discard port");
        assert!(err.to_string().contains("unreachable: request failed"));
        Ok(())
    }
}
