//! Parameter synchronization.
//!
//! The onboard parameter store is a flat name-to-float table. Reads stream
//! the whole table (PARAM_REQUEST_LIST followed by one PARAM_VALUE per
//! entry); writes are confirmed by the vehicle echoing the parameter back
//! as another PARAM_VALUE. Both flows subscribe to the session's message
//! stream *before* transmitting, so no echo can be missed.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, instrument, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::metadata::ParamMetadata;
use crate::protocol::{MessagePayload, ParamRequestList, ParamSet, ParamValue};
use crate::session::ConnectionSession;
use crate::types::ParamType;

/// One onboard parameter with its last reported value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f32,
    pub param_type: ParamType,
    pub index: u16,
    pub total_count: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ParamMetadata>,
}

impl Parameter {
    fn from_report(report: ParamValue) -> Self {
        Self {
            name: report.name,
            value: report.value,
            param_type: report.param_type,
            index: report.index,
            total_count: report.total_count,
            metadata: None,
        }
    }
}

/// Full (or partial) snapshot of the onboard table, keyed by name.
pub type ParameterSet = BTreeMap<String, Parameter>;

/// Result of a batch write: every name is accounted for either in
/// `applied` or in `failures`.
#[derive(Debug)]
pub struct SetManyOutcome {
    pub applied: ParameterSet,
    pub total: usize,
    pub failures: Vec<(String, GatewayError)>,
}

impl SetManyOutcome {
    /// True when every requested write was confirmed.
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Streams and writes the onboard parameter table over a session.
#[derive(Debug, Clone)]
pub struct ParameterSynchronizer {
    read_timeout: Duration,
    confirm_timeout: Duration,
}

impl ParameterSynchronizer {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            read_timeout: config.param_read_timeout(),
            confirm_timeout: config.param_confirm_timeout(),
        }
    }

    /// Read the entire onboard table.
    ///
    /// Completion is by count: the vehicle reports its total in every
    /// PARAM_VALUE, and the read finishes once that many distinct names
    /// have arrived. Duplicate reports overwrite; an incomplete set at the
    /// deadline is returned inside [`GatewayError::PartialParameterSet`].
    #[instrument(skip(self, session), fields(link = %session.link_id()))]
    pub async fn read_all(&self, session: &ConnectionSession) -> Result<ParameterSet> {
        let mut stream = session.subscribe();
        let (target_system, target_component) = session.target();
        session
            .send(MessagePayload::ParamRequestList(ParamRequestList {
                target_system,
                target_component,
            }))
            .await?;

        let deadline = tokio::time::Instant::now() + self.read_timeout;
        let mut params = ParameterSet::new();
        let mut expected: Option<u16> = None;

        loop {
            let message = match tokio::time::timeout_at(deadline, stream.recv()).await {
                Ok(Ok(message)) => message,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "parameter stream lagged, continuing");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => return Err(GatewayError::SessionClosed),
                Err(_) => {
                    let expected = expected.unwrap_or(0).max(params.len() as u16);
                    return Err(GatewayError::PartialParameterSet {
                        got: params.len(),
                        expected,
                        partial: params,
                    });
                }
            };
            if let MessagePayload::ParamValue(ref report) = message.payload {
                expected = Some(report.total_count);
                let param = Parameter::from_report(report.clone());
                params.insert(param.name.clone(), param);
                if let Some(total) = expected
                    && params.len() >= usize::from(total)
                {
                    debug!(count = params.len(), "parameter read complete");
                    return Ok(params);
                }
            }
        }
    }

    /// Write one parameter and wait for the vehicle to echo it back.
    ///
    /// The echo's value is compared bit-for-bit against the request;
    /// vehicles clamp out-of-range writes, and a clamped echo surfaces as
    /// [`GatewayError::ParameterMismatch`]. No echo at all within the
    /// confirm window is [`GatewayError::ParameterUnconfirmed`].
    #[instrument(skip(self, session), fields(link = %session.link_id()))]
    pub async fn set_one(
        &self,
        session: &ConnectionSession,
        name: &str,
        value: f32,
        param_type: ParamType,
    ) -> Result<Parameter> {
        if name.is_empty() || name.len() > crate::protocol::PARAM_NAME_LEN {
            return Err(GatewayError::InvalidParamName { name: name.to_string() });
        }

        let mut stream = session.subscribe();
        let (target_system, target_component) = session.target();
        session
            .send(MessagePayload::ParamSet(ParamSet {
                value,
                target_system,
                target_component,
                name: name.to_string(),
                param_type,
            }))
            .await?;

        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        loop {
            let message = match tokio::time::timeout_at(deadline, stream.recv()).await {
                Ok(Ok(message)) => message,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "parameter stream lagged, continuing");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => return Err(GatewayError::SessionClosed),
                Err(_) => {
                    return Err(GatewayError::ParameterUnconfirmed { name: name.to_string() });
                }
            };
            if let MessagePayload::ParamValue(ref report) = message.payload
                && report.name == name
            {
                // Exact comparison on purpose: the vehicle echoes the very
                // bits it stored.
                if report.value == value {
                    return Ok(Parameter::from_report(report.clone()));
                }
                return Err(GatewayError::ParameterMismatch {
                    name: name.to_string(),
                    requested: value,
                    confirmed: report.value,
                });
            }
        }
    }

    /// Write a batch of parameters, one confirmed write at a time.
    ///
    /// Sequential on purpose: echoes carry only the name, and interleaved
    /// writes to the same transport would make confirmation ambiguous. A
    /// failed write is recorded and the batch continues.
    pub async fn set_many(
        &self,
        session: &ConnectionSession,
        requests: &[(String, f32, ParamType)],
    ) -> SetManyOutcome {
        let mut applied = ParameterSet::new();
        let mut failures = Vec::new();
        for (name, value, param_type) in requests {
            match self.set_one(session, name, *value, *param_type).await {
                Ok(param) => {
                    applied.insert(param.name.clone(), param);
                }
                Err(err) => {
                    debug!(name, error = %err, "parameter write failed");
                    failures.push((name.clone(), err));
                }
            }
        }
        SetManyOutcome { applied, total: requests.len(), failures }
    }
}
