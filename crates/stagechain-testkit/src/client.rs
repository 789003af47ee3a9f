//! A simulated runtime client.
//!
//! Replays what the executing client does with an entry point: fetch the
//! verification stage, pass it the entry point's argument, follow each hop
//! with the header it names, honour every `~= N then return end` guard, and
//! finally decode the payload with the reassembled key. Stage text is read
//! with regular expressions, so the client only knows what the stages
//! themselves say.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use stagechain::{DeliveryPolicy, Rejection, StageRequest, StageRole, StageServer};
use stagechain_core::{checksum, cipher, now_millis};
use stagechain_store::StageStore;

/// Why a simulated run did not produce the script.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server refused a fetch.
    #[error("fetch of {url} rejected: {rejection}")]
    Rejected {
        /// The URL that was requested.
        url: String,
        /// The server's answer.
        rejection: Rejection,
    },

    /// A stage's guard failed and it returned early.
    #[error("{stage:?} stage halted: {reason}")]
    Halted {
        /// The stage that stopped.
        stage: StageRole,
        /// Which guard failed.
        reason: String,
    },

    /// Stage text did not have the expected shape.
    #[error("malformed: {0}")]
    Malformed(String),
}

/// Result type for simulated runs.
pub type Result<T> = std::result::Result<T, ClientError>;

struct Patterns {
    entry: Regex,
    http_get: Regex,
    presented_guard: Regex,
    content_guard: Regex,
    forward: Regex,
    literal: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        entry: Regex::new(r"^(loadstring\(.*\))\((\d+)\)$").expect("valid pattern"),
        http_get: Regex::new(r#"game:HttpGet\("([^"]+)", true, \{\["([^"]+)"\] = "([^"]*)"\}\)"#)
            .expect("valid pattern"),
        presented_guard: Regex::new(r"^local (\w+) = \.\.\. if (\w+) ~= (\d+) then return end")
            .expect("valid pattern"),
        content_guard: Regex::new(r"if \w+\(\w+\) ~= (\d+) then return end")
            .expect("valid pattern"),
        forward: Regex::new(r#"loadstring\(\w+\)\("([^"]*)"\)$"#).expect("valid pattern"),
        literal: Regex::new(r#"local \w+ = "([A-Za-z0-9_]*)""#).expect("valid pattern"),
    })
}

/// A hop parsed out of stage text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// URL to fetch.
    pub url: String,
    /// Header name to present.
    pub header_name: String,
    /// Header value to present.
    pub header_value: String,
}

/// Drives a chain against a [`StageServer`] the way the runtime client would.
pub struct SimulatedClient<'a, S: StageStore> {
    server: &'a StageServer<S>,
    identity: String,
    now: i64,
}

impl<'a, S: StageStore> SimulatedClient<'a, S> {
    /// A client that identifies itself with the server's expected marker.
    pub fn new(server: &'a StageServer<S>) -> Self {
        let identity = format!("{}/WinInet", server.policy().client_marker);
        Self {
            server,
            identity,
            now: now_millis(),
        }
    }

    /// Use a different `User-Agent`.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Evaluate expiry at `now` (Unix ms) instead of the wall clock.
    pub fn at(mut self, now: i64) -> Self {
        self.now = now;
        self
    }

    /// Run an entry point to completion and return the decoded script.
    pub async fn run(&self, entry_point: &str) -> Result<String> {
        let p = patterns();

        // Entry point: loadstring(HttpGet(...))(argument)
        let caps = p
            .entry
            .captures(entry_point.trim())
            .ok_or_else(|| ClientError::Malformed("entry point shape".into()))?;
        let presented: u8 = parse_sum(&caps[2])?;
        let first = parse_hop(&caps[1])?;

        // Verification stage
        let verification = self.fetch(&first).await?;
        let guard = p
            .presented_guard
            .captures(&verification)
            .ok_or_else(|| ClientError::Malformed("verification guard".into()))?;
        if guard[1] != guard[2] {
            return Err(ClientError::Malformed("guard checks a different local".into()));
        }
        if presented != parse_sum(&guard[3])? {
            return Err(ClientError::Halted {
                stage: StageRole::Verification,
                reason: "entry checksum mismatch".into(),
            });
        }
        let next = parse_hop(&verification)?;
        let decrypt = self.fetch(&next).await?;
        check_content(&verification, &decrypt, StageRole::Verification)?;
        let key_part1 = p
            .forward
            .captures(&verification)
            .map(|c| c[1].to_string())
            .ok_or_else(|| ClientError::Malformed("forwarded key part".into()))?;

        // Decrypt stage
        let payload_hop = parse_hop(&decrypt)?;
        let payload = self.fetch(&payload_hop).await?;
        check_content(&decrypt, &payload, StageRole::Decrypt)?;
        let key_part2 = p
            .literal
            .captures(&decrypt)
            .map(|c| c[1].to_string())
            .ok_or_else(|| ClientError::Malformed("embedded key part".into()))?;

        let key = format!("{}{}", key_part1, key_part2);
        let plain = cipher::decrypt(&payload, key.as_bytes())
            .map_err(|e| ClientError::Malformed(format!("payload: {}", e)))?;
        String::from_utf8(plain).map_err(|e| ClientError::Malformed(format!("payload: {}", e)))
    }

    /// Fetch one hop through the server.
    pub async fn fetch(&self, hop: &Hop) -> Result<String> {
        let id = hop
            .url
            .rsplit_once('/')
            .map(|(_, id)| id)
            .unwrap_or(&hop.url);
        let request = StageRequest::new(id)
            .client(self.identity.as_str())
            .header(&hop.header_name, hop.header_value.as_str());

        let content = self
            .server
            .serve(&request, self.now)
            .await
            .map_err(|rejection| ClientError::Rejected {
                url: hop.url.clone(),
                rejection,
            })?;
        String::from_utf8(content.to_vec())
            .map_err(|e| ClientError::Malformed(format!("stage text: {}", e)))
    }
}

/// The first `HttpGet` call in `text`.
pub fn parse_hop(text: &str) -> Result<Hop> {
    let caps = patterns()
        .http_get
        .captures(text)
        .ok_or_else(|| ClientError::Malformed("no HttpGet call".into()))?;
    Ok(Hop {
        url: caps[1].to_string(),
        header_name: caps[2].to_string(),
        header_value: caps[3].to_string(),
    })
}

fn parse_sum(digits: &str) -> Result<u8> {
    digits
        .parse()
        .map_err(|_| ClientError::Malformed(format!("checksum literal {}", digits)))
}

fn check_content(stage: &str, fetched: &str, role: StageRole) -> Result<()> {
    let caps = patterns()
        .content_guard
        .captures(stage)
        .ok_or_else(|| ClientError::Malformed("content guard".into()))?;
    if checksum(fetched.as_bytes()) != parse_sum(&caps[1])? {
        return Err(ClientError::Halted {
            stage: role,
            reason: "fetched content checksum mismatch".into(),
        });
    }
    Ok(())
}

/// The identity a client must not present to pass delivery.
pub fn foreign_identity(policy: &DeliveryPolicy) -> String {
    format!("curl/8.0 (not {})", policy.client_marker.to_ascii_lowercase())
}
