// Configuration validation, run after all sources are merged.
//
// Operator typos (unknown timezone, bad listen address, unknown bucket
// kind) are caught here, before any I/O happens.

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use tally_core::BucketKind;

use crate::{RuntimeConfig, StorageBackend};

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown IANA timezone '{}': {}", self.timezone, e))?;

        self.server
            .listen_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid listen address '{}'", self.server.listen_addr))?;

        if self.storage.backend == StorageBackend::Fs && self.storage.fs.is_none() {
            bail!("storage.fs configuration required for the filesystem backend");
        }

        if self.buffer.max_batch == 0 {
            bail!("buffer.max_batch must be at least 1");
        }

        parse_publish_time(&self.publish.time)
            .with_context(|| format!("Invalid publish.time '{}'", self.publish.time))?;

        for kind in &self.publish.kinds {
            kind.parse::<BucketKind>()
                .with_context(|| format!("Invalid publish.kinds entry '{}'", kind))?;
        }

        if let Some(url) = &self.notify.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("notify.url must be an http(s) URL, got '{}'", url);
            }
        }

        Ok(())
    }

    /// Parsed timezone; call only after [`RuntimeConfig::validate`].
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Parsed publication buckets; call only after validation.
    pub fn publish_kinds(&self) -> Vec<BucketKind> {
        self.publish
            .kinds
            .iter()
            .filter_map(|kind| kind.parse().ok())
            .collect()
    }
}

/// Parse a "HH:MM" wall-clock token into (hour, minute).
pub fn parse_publish_time(raw: &str) -> Result<(u32, u32)> {
    let (hour, minute) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("expected HH:MM"))?;
    let hour: u32 = hour.parse().context("hour is not a number")?;
    let minute: u32 = minute.parse().context("minute is not a number")?;
    if hour > 23 || minute > 59 {
        bail!("hour must be 0-23 and minute 0-59");
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_timezone_fails_validation() {
        let config = RuntimeConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_listen_addr_fails_validation() {
        let mut config = RuntimeConfig::default();
        config.server.listen_addr = "not-an-addr".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_publish_kind_fails_validation() {
        let mut config = RuntimeConfig::default();
        config.publish.kinds = vec!["hourly".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn publish_time_parses() {
        assert_eq!(parse_publish_time("21:00").unwrap(), (21, 0));
        assert_eq!(parse_publish_time("06:05").unwrap(), (6, 5));
        assert!(parse_publish_time("24:00").is_err());
        assert!(parse_publish_time("12:60").is_err());
        assert!(parse_publish_time("noon").is_err());
    }

    #[test]
    fn publish_kinds_resolve_after_validation() {
        let config = RuntimeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.publish_kinds().len(), 4);
        assert_eq!(config.tz(), chrono_tz::UTC);
    }

    #[test]
    fn bad_notify_url_fails_validation() {
        let mut config = RuntimeConfig::default();
        config.notify.url = Some("ftp://example.com/hook".to_string());
        assert!(config.validate().is_err());
    }
}
