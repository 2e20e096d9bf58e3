//! Round participation endpoints of the Chaumian CoinJoin coordinator.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;
use crate::transport::{BackendRequest, BackendTransport};
use crate::types::{ActiveOutput, RegistrationOutcome, RoundId};
use crate::version::ProtocolVersion;

/// Wire shape of an output registration.
#[derive(Debug, Serialize)]
struct OutputRequest {
    #[serde(rename = "OutputAddress")]
    output_address: String,
    #[serde(rename = "UnblindedSignature")]
    unblinded_signature: String,
    #[serde(rename = "Level")]
    level: u32,
}

impl From<&ActiveOutput> for OutputRequest {
    fn from(output: &ActiveOutput) -> Self {
        Self {
            output_address: output.address.to_string(),
            unblinded_signature: output.signature.to_hex(),
            level: output.mixing_level,
        }
    }
}

/// Registers participant outputs during a round's output registration phase.
///
/// Meant to be used over a fresh anonymous identity, separate from the one
/// that registered the inputs.
pub struct OutputRegistrationClient {
    transport: Arc<dyn BackendTransport>,
    protocol_version: Arc<ProtocolVersion>,
}

impl OutputRegistrationClient {
    pub fn new(
        transport: Arc<dyn BackendTransport>,
        protocol_version: Arc<ProtocolVersion>,
    ) -> Self {
        Self {
            transport,
            protocol_version,
        }
    }

    /// Submit `output` to round `round_id`.
    ///
    /// A conflict response means the round has already moved past output
    /// registration and is reported as [`RegistrationOutcome::PhaseAdvanced`],
    /// not as an error. The request is sent exactly once: resending after a
    /// phase change could be mistaken for acceptance, so retry policy belongs
    /// to the caller.
    pub async fn register_output(
        &self,
        round_id: RoundId,
        output: &ActiveOutput,
    ) -> Result<RegistrationOutcome, CoreError> {
        if round_id < 0 {
            return Err(CoreError::Precondition(format!(
                "round id must be non-negative, got {round_id}"
            )));
        }

        let path = format!(
            "{}/btc/chaumiancoinjoin/output?roundId={round_id}",
            self.protocol_version.api_prefix()
        );

        let request = BackendRequest::post_json(path, &OutputRequest::from(output))?;
        let resp = self.transport.send(request).await?;
        match resp.status {
            StatusCode::NO_CONTENT => {
                debug!(round_id, level = output.mixing_level, "output registered");
                Ok(RegistrationOutcome::Accepted)
            }
            StatusCode::CONFLICT => {
                debug!(round_id, "round left output registration before submission");
                Ok(RegistrationOutcome::PhaseAdvanced)
            }
            _ => Err(resp.into_remote_error()),
        }
    }
}
