//! Wire envelope around a job payload
//!
//! Every submitted job travels as `{"id": ..., "type": ..., "job": ...}`
//! where `type` is the canonical variant name. The serialized form always
//! contains the literal substring `"type":"<VariantName>"`, so a consumer
//! can route on a textual probe before committing to a full parse.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::job::{GetFeatureInfoJob, GetFeatureJob, GetMapJob, Job, LegendJob};
use crate::jobs::{DispatchError, DispatchResult};

/// Canonical discriminator of a job kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    GetMap,
    GetFeatureInfo,
    GetFeature,
    Legend,
}

impl JobKind {
    /// All kinds, in probe order
    pub const ALL: [JobKind; 4] = [
        JobKind::GetMap,
        JobKind::GetFeatureInfo,
        JobKind::GetFeature,
        JobKind::Legend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::GetMap => "GetMap",
            JobKind::GetFeatureInfo => "GetFeatureInfo",
            JobKind::GetFeature => "GetFeature",
            JobKind::Legend => "Legend",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        JobKind::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Route an encoded envelope by textual probe, without parsing it.
    ///
    /// Both the compact `"type":"X"` and the spaced `"type": "X"` spellings
    /// are recognized.
    pub fn probe(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        JobKind::ALL.into_iter().find(|kind| {
            text.contains(&format!("\"type\":\"{}\"", kind.as_str()))
                || text.contains(&format!("\"type\": \"{}\"", kind.as_str()))
        })
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serialized shape of the envelope, typed per job kind
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireEnvelope<T> {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    job: T,
}

/// Minimal head used to recover the id of an otherwise undecodable envelope
#[derive(Debug, Deserialize)]
struct EnvelopeHead {
    id: String,
}

/// A job payload wrapped with its identity and discriminator
#[derive(Debug, Clone, PartialEq)]
pub struct JobEnvelope {
    /// Freshly generated uuid, unique per submission
    pub id: String,

    pub job: Job,
}

impl JobEnvelope {
    /// Wrap a job with a freshly allocated id
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job,
        }
    }

    /// Wrap a job under a caller-provided id
    pub fn with_id(id: impl Into<String>, job: Job) -> Self {
        Self { id: id.into(), job }
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind()
    }

    /// Serialize to the `{id, type, job}` wire document.
    ///
    /// Payload rules are enforced here as well as at decode, so a
    /// contract-violating job never reaches the queue.
    pub fn encode(&self) -> DispatchResult<Vec<u8>> {
        self.job.validate()?;
        // compact JSON: the canonical discriminator substring is
        // `"type":"<VariantName>"`, which is the spelling the probe matches;
        // the spaced form is accepted on decode for foreign producers only
        let kind = self.kind().as_str().to_string();
        let encoded = match &self.job {
            Job::GetMap(job) => serde_json::to_vec(&WireEnvelope {
                id: self.id.clone(),
                kind,
                job,
            }),
            Job::GetFeatureInfo(job) => serde_json::to_vec(&WireEnvelope {
                id: self.id.clone(),
                kind,
                job,
            }),
            Job::GetFeature(job) => serde_json::to_vec(&WireEnvelope {
                id: self.id.clone(),
                kind,
                job,
            }),
            Job::Legend(job) => serde_json::to_vec(&WireEnvelope {
                id: self.id.clone(),
                kind,
                job,
            }),
        };
        encoded.map_err(|e| DispatchError::MalformedEnvelope(e.to_string()))
    }

    /// Parse an encoded envelope: probe the discriminator, run the typed
    /// deserializer for that variant, then validate the payload rules.
    pub fn decode(payload: &[u8]) -> DispatchResult<Self> {
        let kind = match JobKind::probe(payload) {
            Some(kind) => kind,
            None => {
                let declared = serde_json::from_slice::<serde_json::Value>(payload)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
                    .unwrap_or_else(|| "<missing>".to_string());
                return Err(DispatchError::UnsupportedJobKind(declared));
            }
        };
        let envelope = match kind {
            JobKind::GetMap => {
                let wire: WireEnvelope<GetMapJob> = parse(payload)?;
                check_kind(&wire, kind)?;
                JobEnvelope::with_id(wire.id, Job::GetMap(wire.job))
            }
            JobKind::GetFeatureInfo => {
                let wire: WireEnvelope<GetFeatureInfoJob> = parse(payload)?;
                check_kind(&wire, kind)?;
                JobEnvelope::with_id(wire.id, Job::GetFeatureInfo(wire.job))
            }
            JobKind::GetFeature => {
                let wire: WireEnvelope<GetFeatureJob> = parse(payload)?;
                check_kind(&wire, kind)?;
                JobEnvelope::with_id(wire.id, Job::GetFeature(wire.job))
            }
            JobKind::Legend => {
                let wire: WireEnvelope<LegendJob> = parse(payload)?;
                check_kind(&wire, kind)?;
                JobEnvelope::with_id(wire.id, Job::Legend(wire.job))
            }
        };
        envelope.job.validate()?;
        Ok(envelope)
    }

    /// Best-effort id extraction from an envelope that failed to decode,
    /// so its record can still be driven to `failed`.
    pub fn peek_id(payload: &[u8]) -> Option<String> {
        serde_json::from_slice::<EnvelopeHead>(payload)
            .ok()
            .map(|head| head.id)
    }
}

fn parse<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> DispatchResult<WireEnvelope<T>> {
    serde_json::from_slice(payload).map_err(|e| DispatchError::MalformedEnvelope(e.to_string()))
}

fn check_kind<T>(wire: &WireEnvelope<T>, probed: JobKind) -> DispatchResult<()> {
    if wire.kind != probed.as_str() {
        return Err(DispatchError::MalformedEnvelope(format!(
            "discriminator `{}` does not match probed kind `{}`",
            wire.kind, probed
        )));
    }
    Ok(())
}
