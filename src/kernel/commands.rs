//! Inbound runtime-control commands and outbound kernel events.
//!
//! Commands are actions the control surface requests of the running
//! kernel (mode changes, stepping, force/mask). They are runtime-only:
//! none of them mutates configuration. Results travel back as
//! [`KernelEvent`]s and are also observable in subsequent snapshots.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Correlation id assigned by the caller and echoed in the result.
pub type RequestId = u64;

/// Scheduler run mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    #[default]
    Normal,
    Step,
    Breakpoint,
}

/// Input force applied to a DI or AI card. FORCED_HIGH/LOW are valid
/// for DI only, FORCED_VALUE for AI only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum InputForce {
    #[serde(rename = "REAL")]
    Real,
    #[serde(rename = "FORCED_HIGH")]
    ForcedHigh,
    #[serde(rename = "FORCED_LOW")]
    ForcedLow,
    #[serde(rename = "FORCED_VALUE")]
    ForcedValue { value: u32 },
}

/// Commands the kernel drains from the bounded queue each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelCommand {
    SetRunMode(RunMode),
    /// Evaluate exactly one card, then pause again (STEP mode only).
    StepOnce,
    /// Resume past a halted breakpoint (BREAKPOINT mode only).
    Continue,
    SetBreakpoint {
        card_id: u32,
        enabled: bool,
    },
    SetInputForce {
        card_id: u32,
        force: InputForce,
    },
    SetOutputMask {
        card_id: u32,
        masked: bool,
    },
    SetOutputMaskGlobal {
        masked: bool,
    },
    /// Clear latched critical faults on one card, or all cards.
    AckFaults {
        card_id: Option<u32>,
    },
}

/// A command with its correlation id, as queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub request_id: RequestId,
    pub command: KernelCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Success,
    Failure,
}

/// Outcome of a queued command, emitted on the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub request_id: RequestId,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Revision of the last snapshot published before this result;
    /// the command's effect is visible no later than the next one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_revision: Option<u64>,
}

impl CommandResult {
    pub fn success(request_id: RequestId, snapshot_revision: u64) -> Self {
        Self {
            request_id,
            status: CommandStatus::Success,
            error_code: None,
            message: None,
            snapshot_revision: Some(snapshot_revision),
        }
    }

    pub fn failure(request_id: RequestId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status: CommandStatus::Failure,
            error_code: Some(code),
            message: Some(message.into()),
            snapshot_revision: None,
        }
    }
}

/// Events the kernel pushes toward the control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelEvent {
    CommandResult(CommandResult),
    /// A validated configuration was adopted at a scan boundary.
    ConfigAdopted {
        config_id: String,
        revision: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_wire_names() {
        assert_eq!(serde_json::to_string(&RunMode::Normal).unwrap(), "\"NORMAL\"");
        assert_eq!(
            serde_json::to_string(&RunMode::Breakpoint).unwrap(),
            "\"BREAKPOINT\""
        );
        let parsed: RunMode = serde_json::from_str("\"STEP\"").unwrap();
        assert_eq!(parsed, RunMode::Step);
    }

    #[test]
    fn input_force_tagged_by_mode() {
        let json = serde_json::to_value(InputForce::ForcedValue { value: 420 }).unwrap();
        assert_eq!(json["mode"], "FORCED_VALUE");
        assert_eq!(json["value"], 420);

        let parsed: InputForce = serde_json::from_str("{\"mode\":\"REAL\"}").unwrap();
        assert_eq!(parsed, InputForce::Real);
    }

    #[test]
    fn command_result_serialization_omits_empty_fields() {
        let ok = CommandResult::success(7, 41);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["requestId"], 7);
        assert_eq!(json["status"], "SUCCESS");
        assert!(json.get("errorCode").is_none());

        let err = CommandResult::failure(8, ErrorCode::Busy, "queue full");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["errorCode"], "BUSY");
    }
}
