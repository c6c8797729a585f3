//! Signed, paginated client for the account-activity API.
//!
//! One client with an injected termination policy replaces the divergent
//! polling variants that accumulated in earlier deployments. A fetch either
//! returns every retained record or fails as a whole; pages are never
//! skipped silently.

use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::activity::types::{ExternalAccount, PageResponse, ServerTime};
use crate::error::{ActivityApiError, Result};
use crate::store::RecordStore;

/// When to stop paging, beyond the unconditional empty-page stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Stop once this many consecutive already-known records were seen.
    ConsecutiveKnown(u32),
    /// Stop after the page containing this record identifier.
    SentinelId(String),
    /// Stop once the running count reaches the provider's reported total.
    ProviderTotal,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        TerminationPolicy::ConsecutiveKnown(10)
    }
}

impl TerminationPolicy {
    /// Parse `consecutive:<n>`, `sentinel:<id>` or `total`.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "total" {
            return Some(TerminationPolicy::ProviderTotal);
        }
        if let Some(n) = raw.strip_prefix("consecutive:") {
            return n.parse().ok().map(TerminationPolicy::ConsecutiveKnown);
        }
        if let Some(id) = raw.strip_prefix("sentinel:") {
            if !id.is_empty() {
                return Some(TerminationPolicy::SentinelId(id.to_string()));
            }
        }
        None
    }
}

/// What to do with records whose account id is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Re-include known records so their balances refresh.
    #[default]
    RefreshKnown,
    /// Drop known records; only new accounts are returned.
    DropKnown,
}

impl DedupPolicy {
    /// Parse `refresh` or `drop`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "refresh" => Some(DedupPolicy::RefreshKnown),
            "drop" => Some(DedupPolicy::DropKnown),
            _ => None,
        }
    }
}

/// Construction parameters for [`ActivityClient`].
#[derive(Debug, Clone)]
pub struct ActivityClientConfig {
    pub api_key: String,
    pub api_secret: SecretString,
    pub base_url: String,
    pub page_size: u32,
    pub page_delay: Duration,
    pub termination: TerminationPolicy,
    pub dedup: DedupPolicy,
}

/// Authenticated pager over `GET /api/v1/agent/inviteUserList`.
pub struct ActivityClient {
    config: ActivityClientConfig,
    client: reqwest::Client,
}

impl ActivityClient {
    pub fn new(config: ActivityClientConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Timestamp for the signature scheme, from the provider's own clock.
    ///
    /// Falls back to local wall-clock milliseconds so pagination can
    /// proceed when the time endpoint is unreachable.
    async fn server_time(&self) -> i64 {
        let url = format!("{}/api/v1/time", self.config.base_url);
        let fetched = async {
            let resp = self
                .client
                .get(&url)
                .timeout(Duration::from_secs(5))
                .send()
                .await
                .ok()?;
            resp.json::<ServerTime>().await.ok().map(|t| t.server_time)
        }
        .await;

        match fetched {
            Some(ts) => ts,
            None => {
                warn!("Server time unavailable, falling back to local clock");
                chrono::Utc::now().timestamp_millis()
            }
        }
    }

    /// Fetch one page. `None` data with a zero code means "no more pages".
    async fn fetch_page(&self, page_index: u32) -> std::result::Result<PageResponse, ActivityApiError> {
        let timestamp = self.server_time().await;

        let params = [
            ("pageIndex", page_index.to_string()),
            ("pageSize", self.config.page_size.to_string()),
            ("timestamp", timestamp.to_string()),
        ];
        let signature = sign_query(
            &canonical_query(&params),
            self.config.api_secret.expose_secret(),
        );

        let url = format!("{}/api/v1/agent/inviteUserList", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&params)
            .query(&[("signature", signature)])
            .header("X-API-KEY", &self.config.api_key)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ActivityApiError::RequestFailed {
                page: page_index,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ActivityApiError::RequestFailed {
                page: page_index,
                reason: format!("status {}", resp.status()),
            });
        }

        resp.json::<PageResponse>()
            .await
            .map_err(|e| ActivityApiError::DecodeFailed {
                page: page_index,
                reason: e.to_string(),
            })
    }

    /// Fetch the full remain of activity records, page by page, asking the
    /// store which account ids are already known.
    pub async fn fetch_all(&self, store: &dyn RecordStore) -> Result<Vec<ExternalAccount>> {
        let mut retained: Vec<ExternalAccount> = Vec::new();
        let mut terminator = Terminator::new(self.config.termination.clone());
        let mut page_index: u32 = 1;

        loop {
            debug!(page = page_index, page_size = self.config.page_size, "Fetching activity page");
            let page = self.fetch_page(page_index).await?;

            let Some(data) = page.data else {
                if page.code != 0 {
                    return Err(ActivityApiError::ProviderError {
                        page: page_index,
                        code: page.code,
                    }
                    .into());
                }
                debug!(page = page_index, "No data in page, stopping");
                break;
            };

            if data.list.is_empty() {
                debug!(page = page_index, "Empty page, stopping");
                break;
            }

            let mut page_new = 0usize;
            let mut page_known = 0usize;

            for record in &data.list {
                let Some(account) = ExternalAccount::from_record(record) else {
                    warn!(page = page_index, "Skipping record without account id");
                    continue;
                };

                let known = store.account_exists(&account.account_id).await?;
                terminator.observe(&account.account_id, known);

                if known {
                    page_known += 1;
                } else {
                    page_new += 1;
                }

                if !known || self.config.dedup == DedupPolicy::RefreshKnown {
                    retained.push(account);
                }
            }

            terminator.page_done(data.total);

            info!(
                page = page_index,
                new = page_new,
                known = page_known,
                "Activity page processed"
            );

            if terminator.should_stop() {
                info!(page = page_index, "Pagination stop condition reached");
                break;
            }

            page_index += 1;
            tokio::time::sleep(self.config.page_delay).await;
        }

        info!(records = retained.len(), "Activity fetch complete");
        Ok(retained)
    }
}

// ── Signing ─────────────────────────────────────────────────────────

/// Canonical query string: `k=v&k=v…` sorted lexicographically by key.
pub fn canonical_query(params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex HMAC-SHA256 digest of the canonical query under the shared secret.
pub fn sign_query(query: &str, secret: &str) -> String {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

// ── Termination tracking ────────────────────────────────────────────

/// Evaluates the injected stop policy while records stream past.
struct Terminator {
    policy: TerminationPolicy,
    consecutive_known: u32,
    fetched: u64,
    provider_total: Option<u64>,
    sentinel_seen: bool,
}

impl Terminator {
    fn new(policy: TerminationPolicy) -> Self {
        Self {
            policy,
            consecutive_known: 0,
            fetched: 0,
            provider_total: None,
            sentinel_seen: false,
        }
    }

    fn observe(&mut self, account_id: &str, known: bool) {
        self.fetched += 1;
        if known {
            self.consecutive_known += 1;
        } else {
            self.consecutive_known = 0;
        }
        if let TerminationPolicy::SentinelId(ref sentinel) = self.policy {
            if account_id == sentinel {
                self.sentinel_seen = true;
            }
        }
    }

    fn page_done(&mut self, provider_total: Option<u64>) {
        if provider_total.is_some() {
            self.provider_total = provider_total;
        }
    }

    fn should_stop(&self) -> bool {
        match self.policy {
            TerminationPolicy::ConsecutiveKnown(threshold) => {
                self.consecutive_known >= threshold
            }
            TerminationPolicy::SentinelId(_) => self.sentinel_seen,
            TerminationPolicy::ProviderTotal => match self.provider_total {
                Some(total) => self.fetched >= total,
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Policy parsing ──────────────────────────────────────────────

    #[test]
    fn parse_termination_policies() {
        assert_eq!(
            TerminationPolicy::parse("consecutive:10"),
            Some(TerminationPolicy::ConsecutiveKnown(10))
        );
        assert_eq!(
            TerminationPolicy::parse("sentinel:983265275"),
            Some(TerminationPolicy::SentinelId("983265275".into()))
        );
        assert_eq!(
            TerminationPolicy::parse("total"),
            Some(TerminationPolicy::ProviderTotal)
        );
        assert_eq!(TerminationPolicy::parse("sentinel:"), None);
        assert_eq!(TerminationPolicy::parse("consecutive:x"), None);
        assert_eq!(TerminationPolicy::parse("bogus"), None);
    }

    #[test]
    fn parse_dedup_policies() {
        assert_eq!(DedupPolicy::parse("refresh"), Some(DedupPolicy::RefreshKnown));
        assert_eq!(DedupPolicy::parse("drop"), Some(DedupPolicy::DropKnown));
        assert_eq!(DedupPolicy::parse("other"), None);
    }

    // ── Canonical query + signature ─────────────────────────────────

    #[test]
    fn canonical_query_sorts_by_key() {
        let params = [
            ("timestamp", "170".to_string()),
            ("pageIndex", "1".to_string()),
            ("pageSize", "100".to_string()),
        ];
        assert_eq!(
            canonical_query(&params),
            "pageIndex=1&pageSize=100&timestamp=170"
        );
    }

    #[test]
    fn signature_is_hex_sha256_sized() {
        let sig = sign_query("pageIndex=1&pageSize=100&timestamp=170", "secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_is_deterministic_and_key_sensitive() {
        let query = "pageIndex=1&pageSize=100&timestamp=170";
        assert_eq!(sign_query(query, "secret"), sign_query(query, "secret"));
        assert_ne!(sign_query(query, "secret"), sign_query(query, "other"));
        assert_ne!(
            sign_query(query, "secret"),
            sign_query("pageIndex=2&pageSize=100&timestamp=170", "secret")
        );
    }

    // ── Termination tracking ────────────────────────────────────────

    #[test]
    fn consecutive_known_stops_at_threshold_not_before() {
        let mut t = Terminator::new(TerminationPolicy::ConsecutiveKnown(10));
        for i in 0..9 {
            t.observe(&format!("u{i}"), true);
        }
        assert!(!t.should_stop(), "nine consecutive known must continue");
        t.observe("u9", true);
        assert!(t.should_stop(), "ten consecutive known must stop");
    }

    #[test]
    fn unknown_record_resets_consecutive_counter() {
        let mut t = Terminator::new(TerminationPolicy::ConsecutiveKnown(3));
        t.observe("a", true);
        t.observe("b", true);
        t.observe("c", false);
        t.observe("d", true);
        t.observe("e", true);
        assert!(!t.should_stop());
        t.observe("f", true);
        assert!(t.should_stop());
    }

    #[test]
    fn sentinel_stops_when_seen() {
        let mut t = Terminator::new(TerminationPolicy::SentinelId("983265275".into()));
        t.observe("other", false);
        assert!(!t.should_stop());
        t.observe("983265275", true);
        assert!(t.should_stop());
    }

    #[test]
    fn provider_total_stops_when_count_reached() {
        let mut t = Terminator::new(TerminationPolicy::ProviderTotal);
        t.observe("a", false);
        t.page_done(Some(3));
        assert!(!t.should_stop());
        t.observe("b", false);
        t.observe("c", false);
        t.page_done(Some(3));
        assert!(t.should_stop());
    }

    #[test]
    fn provider_total_without_total_never_stops() {
        let mut t = Terminator::new(TerminationPolicy::ProviderTotal);
        for i in 0..100 {
            t.observe(&format!("u{i}"), false);
        }
        t.page_done(None);
        assert!(!t.should_stop());
    }
}
