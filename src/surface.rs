//! Control surface request dispatch.
//!
//! Transport-decoupled: callers feed request documents
//! `{requestId, name, payload}` and receive response documents. The
//! actual transport (BLE, serial, sockets) lives outside the crate.
//!
//! Two request classes:
//!
//! - **Config lifecycle** (`get_active`, `save_staged`,
//!   `validate_staged`, `commit`, `restore`) runs the commit pipeline
//!   right here, off the kernel thread, and answers synchronously.
//! - **Runtime control** (`set_run_mode`, `step_once`, ...) is shape-
//!   and policy-checked, then queued to the kernel. The synchronous
//!   response acknowledges queueing; the authoritative outcome arrives
//!   as a command-result event and in subsequent snapshots.
//!
//! Unknown command names are rejected with `INVALID_REQUEST`; so is
//! the retired `RUN_SLOW` run mode.

use log::info;
use serde::Serialize;
use serde_json::Value;

use crate::commit::{self, slots::SlotStore, RestoreSource};
use crate::config::{CardBehavior, CardConfig, ConfigEnvelope, HardwareProfile, SCHEMA_VERSION};
use crate::error::{Error, ErrorCode};
use crate::kernel::commands::{
    CommandEnvelope, CommandStatus, InputForce, KernelCommand, RunMode,
};
use crate::kernel::exchange::SnapshotReader;
use crate::kernel::queue::Producer;
use crate::kernel::ProgramMailbox;
use crate::card::mission::WritePolicy;
use crate::ports::{Slot, Storage};

/// Response document for every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceResponse {
    pub request_id: u64,
    /// Caller-supplied wall-clock milliseconds.
    pub timestamp: u64,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_revision: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

pub struct ControlSurface<S: Storage> {
    store: SlotStore<S>,
    profile: HardwareProfile,
    commands: Producer<CommandEnvelope>,
    snapshots: SnapshotReader,
    swap: ProgramMailbox,
    /// Cache of the active envelope for synchronous policy checks.
    active: ConfigEnvelope,
}

impl<S: Storage> ControlSurface<S> {
    /// Build the surface over a bootstrapped slot store and the
    /// kernel's handles.
    pub fn new(
        mut store: SlotStore<S>,
        profile: HardwareProfile,
        commands: Producer<CommandEnvelope>,
        snapshots: SnapshotReader,
        swap: ProgramMailbox,
    ) -> crate::error::Result<Self> {
        let active = store.bootstrap()?;
        Ok(Self {
            store,
            profile,
            commands,
            snapshots,
            swap,
            active,
        })
    }

    /// The active envelope as last committed through this surface.
    pub fn active_config(&self) -> &ConfigEnvelope {
        &self.active
    }

    /// Read access to the persistence slots (diagnostics, audits).
    pub fn slots(&self) -> &SlotStore<S> {
        &self.store
    }

    /// Dispatch one request document.
    pub fn handle(&mut self, request: &Value, now_epoch_ms: u64) -> SurfaceResponse {
        let request_id = request
            .get("requestId")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let Some(name) = request.get("name").and_then(Value::as_str) else {
            return self.fail(request_id, now_epoch_ms, ErrorCode::InvalidRequest, "missing command name");
        };
        let payload = request.get("payload").cloned().unwrap_or(Value::Null);

        match name {
            // ── Config lifecycle ──────────────────────────────
            "get_active" => self.get_active(request_id, now_epoch_ms),
            "save_staged" => self.save_staged(request_id, now_epoch_ms, payload),
            "validate_staged" => self.validate_staged(request_id, now_epoch_ms),
            "commit" => self.commit(request_id, now_epoch_ms),
            "restore" => self.restore(request_id, now_epoch_ms, payload),

            // ── Runtime control ───────────────────────────────
            "set_run_mode" => self.set_run_mode(request_id, now_epoch_ms, payload),
            "step_once" => self.enqueue(request_id, now_epoch_ms, KernelCommand::StepOnce),
            "continue" => self.enqueue(request_id, now_epoch_ms, KernelCommand::Continue),
            "set_breakpoint" => self.set_breakpoint(request_id, now_epoch_ms, payload),
            "set_input_force" => self.set_input_force(request_id, now_epoch_ms, payload),
            "set_output_mask" => self.set_output_mask(request_id, now_epoch_ms, payload),
            "set_output_mask_global" => {
                let Some(masked) = payload.get("masked").and_then(Value::as_bool) else {
                    return self.fail(request_id, now_epoch_ms, ErrorCode::InvalidRequest, "missing 'masked'");
                };
                self.enqueue(request_id, now_epoch_ms, KernelCommand::SetOutputMaskGlobal { masked })
            }
            "ack_faults" => {
                let card_id = payload
                    .get("cardId")
                    .and_then(Value::as_u64)
                    .map(|id| id as u32);
                self.enqueue(request_id, now_epoch_ms, KernelCommand::AckFaults { card_id })
            }

            _ => self.fail(
                request_id,
                now_epoch_ms,
                ErrorCode::InvalidRequest,
                format!("unknown command '{name}'"),
            ),
        }
    }

    // ── Config lifecycle ──────────────────────────────────────

    fn get_active(&mut self, request_id: u64, now: u64) -> SurfaceResponse {
        let payload = serde_json::to_value(&self.active).ok();
        SurfaceResponse {
            request_id,
            timestamp: now,
            status: CommandStatus::Success,
            error_code: None,
            message: None,
            snapshot_revision: Some(self.snapshots.revision()),
            payload,
        }
    }

    fn save_staged(&mut self, request_id: u64, now: u64, payload: Value) -> SurfaceResponse {
        let envelope: ConfigEnvelope = match serde_json::from_value(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                return self.fail(
                    request_id,
                    now,
                    ErrorCode::InvalidRequest,
                    format!("malformed envelope: {e}"),
                );
            }
        };
        if envelope.schema_version != SCHEMA_VERSION {
            return self.fail(
                request_id,
                now,
                ErrorCode::UnsupportedSchemaVersion,
                format!("schema version '{}'", envelope.schema_version),
            );
        }
        match self.store.write_staged(&envelope) {
            Ok(()) => self.ok(request_id, now, None),
            Err(e) => self.fail(request_id, now, ErrorCode::InternalError, e.to_string()),
        }
    }

    fn validate_staged(&mut self, request_id: u64, now: u64) -> SurfaceResponse {
        let staged = match self.store.read_envelope(Slot::Staged) {
            Ok(envelope) => envelope,
            Err(_) => {
                return self.fail(request_id, now, ErrorCode::NotFound, "no staged configuration");
            }
        };
        match commit::validate_envelope(&staged, &self.profile) {
            Ok(()) => self.ok(request_id, now, None),
            Err(Error::Validation(errors)) => SurfaceResponse {
                request_id,
                timestamp: now,
                status: CommandStatus::Failure,
                error_code: Some(ErrorCode::ValidationFailed),
                message: Some(format!("{} validation errors", errors.len())),
                snapshot_revision: None,
                payload: serde_json::to_value(&errors).ok(),
            },
            Err(e) => self.fail(request_id, now, ErrorCode::InternalError, e.to_string()),
        }
    }

    fn commit(&mut self, request_id: u64, now: u64) -> SurfaceResponse {
        let staged = match self.store.read_envelope(Slot::Staged) {
            Ok(envelope) => envelope,
            Err(_) => {
                return self.fail(request_id, now, ErrorCode::NotFound, "no staged configuration");
            }
        };
        match commit::commit_candidate(&mut self.store, &self.swap, staged.clone(), &self.profile)
        {
            Ok(()) => {
                info!("commit '{}' accepted", staged.config_id);
                self.active = staged;
                self.ok(request_id, now, None)
            }
            Err(Error::Validation(errors)) => SurfaceResponse {
                request_id,
                timestamp: now,
                status: CommandStatus::Failure,
                error_code: Some(ErrorCode::ValidationFailed),
                message: Some(format!("{} validation errors", errors.len())),
                snapshot_revision: None,
                payload: serde_json::to_value(&errors).ok(),
            },
            Err(e) => self.fail(request_id, now, ErrorCode::CommitFailed, e.to_string()),
        }
    }

    fn restore(&mut self, request_id: u64, now: u64, payload: Value) -> SurfaceResponse {
        let source = match payload.get("source").and_then(Value::as_str) {
            Some("LKG") => RestoreSource::Lkg,
            Some("FACTORY") => RestoreSource::Factory,
            _ => {
                return self.fail(
                    request_id,
                    now,
                    ErrorCode::InvalidRequest,
                    "restore source must be LKG or FACTORY",
                );
            }
        };
        match commit::restore(&mut self.store, &self.swap, source, &self.profile) {
            Ok(()) => {
                match self.store.read_envelope(Slot::Active) {
                    Ok(active) => self.active = active,
                    Err(e) => {
                        return self.fail(request_id, now, ErrorCode::InternalError, e.to_string());
                    }
                }
                self.ok(request_id, now, None)
            }
            Err(Error::Validation(errors)) => SurfaceResponse {
                request_id,
                timestamp: now,
                status: CommandStatus::Failure,
                error_code: Some(ErrorCode::ValidationFailed),
                message: Some(format!("{} validation errors", errors.len())),
                snapshot_revision: None,
                payload: serde_json::to_value(&errors).ok(),
            },
            Err(e) => self.fail(request_id, now, ErrorCode::RestoreFailed, e.to_string()),
        }
    }

    // ── Runtime control ───────────────────────────────────────

    fn set_run_mode(&mut self, request_id: u64, now: u64, payload: Value) -> SurfaceResponse {
        let Some(mode_str) = payload.get("mode").and_then(Value::as_str) else {
            return self.fail(request_id, now, ErrorCode::InvalidRequest, "missing 'mode'");
        };
        // The RUN_SLOW mode of earlier firmware generations is gone.
        let mode = match mode_str {
            "NORMAL" => RunMode::Normal,
            "STEP" => RunMode::Step,
            "BREAKPOINT" => RunMode::Breakpoint,
            other => {
                return self.fail(
                    request_id,
                    now,
                    ErrorCode::InvalidRequest,
                    format!("unknown run mode '{other}'"),
                );
            }
        };
        self.enqueue(request_id, now, KernelCommand::SetRunMode(mode))
    }

    fn set_breakpoint(&mut self, request_id: u64, now: u64, payload: Value) -> SurfaceResponse {
        let (Some(card_id), Some(enabled)) = (
            payload.get("cardId").and_then(Value::as_u64),
            payload.get("enabled").and_then(Value::as_bool),
        ) else {
            return self.fail(request_id, now, ErrorCode::InvalidRequest, "need 'cardId' and 'enabled'");
        };
        let card_id = card_id as u32;
        if self.active_card(card_id).is_none() {
            return self.fail(request_id, now, ErrorCode::NotFound, format!("no card {card_id}"));
        }
        self.enqueue(request_id, now, KernelCommand::SetBreakpoint { card_id, enabled })
    }

    fn set_input_force(&mut self, request_id: u64, now: u64, payload: Value) -> SurfaceResponse {
        let Some(card_id) = payload.get("cardId").and_then(Value::as_u64) else {
            return self.fail(request_id, now, ErrorCode::InvalidRequest, "missing 'cardId'");
        };
        let card_id = card_id as u32;
        let force = match payload.get("mode").and_then(Value::as_str) {
            Some("REAL") => InputForce::Real,
            Some("FORCED_HIGH") => InputForce::ForcedHigh,
            Some("FORCED_LOW") => InputForce::ForcedLow,
            Some("FORCED_VALUE") => match payload.get("value").and_then(Value::as_u64) {
                Some(value) => InputForce::ForcedValue {
                    value: value as u32,
                },
                None => {
                    return self.fail(
                        request_id,
                        now,
                        ErrorCode::InvalidRequest,
                        "FORCED_VALUE requires 'value'",
                    );
                }
            },
            _ => {
                return self.fail(request_id, now, ErrorCode::InvalidRequest, "malformed force mode");
            }
        };

        let Some(card) = self.active_card(card_id) else {
            return self.fail(request_id, now, ErrorCode::NotFound, format!("no card {card_id}"));
        };
        let fits = matches!(
            (&card.behavior, force),
            (
                CardBehavior::Di(_),
                InputForce::Real | InputForce::ForcedHigh | InputForce::ForcedLow
            ) | (
                CardBehavior::Ai(_),
                InputForce::Real | InputForce::ForcedValue { .. }
            )
        );
        if !fits {
            return self.fail(
                request_id,
                now,
                ErrorCode::InvalidRequest,
                "force mode does not fit the card family",
            );
        }
        self.enqueue(request_id, now, KernelCommand::SetInputForce { card_id, force })
    }

    fn set_output_mask(&mut self, request_id: u64, now: u64, payload: Value) -> SurfaceResponse {
        let (Some(card_id), Some(masked)) = (
            payload.get("cardId").and_then(Value::as_u64),
            payload.get("masked").and_then(Value::as_bool),
        ) else {
            return self.fail(request_id, now, ErrorCode::InvalidRequest, "need 'cardId' and 'masked'");
        };
        let card_id = card_id as u32;
        let Some(card) = self.active_card(card_id) else {
            return self.fail(request_id, now, ErrorCode::NotFound, format!("no card {card_id}"));
        };
        match &card.behavior {
            CardBehavior::Do(_) => {}
            CardBehavior::Sio(cfg) if cfg.write_policy == WritePolicy::ReadWrite => {}
            CardBehavior::Sio(_) => {
                return self.fail(request_id, now, ErrorCode::Forbidden, "card is read-only");
            }
            _ => {
                return self.fail(
                    request_id,
                    now,
                    ErrorCode::InvalidRequest,
                    "card has no maskable output",
                );
            }
        }
        self.enqueue(request_id, now, KernelCommand::SetOutputMask { card_id, masked })
    }

    // ── Helpers ───────────────────────────────────────────────

    fn active_card(&self, card_id: u32) -> Option<&CardConfig> {
        self.active.cards.iter().find(|c| c.card_id == card_id)
    }

    /// Queue a command for the kernel. A full ring means the kernel is
    /// saturated: the caller backs off and retries.
    fn enqueue(&mut self, request_id: u64, now: u64, command: KernelCommand) -> SurfaceResponse {
        match self.commands.push(CommandEnvelope { request_id, command }) {
            Ok(()) => self.ok(request_id, now, Some("queued".to_string())),
            Err(_) => self.fail(request_id, now, ErrorCode::Busy, "command queue full"),
        }
    }

    fn ok(&self, request_id: u64, now: u64, message: Option<String>) -> SurfaceResponse {
        SurfaceResponse {
            request_id,
            timestamp: now,
            status: CommandStatus::Success,
            error_code: None,
            message,
            snapshot_revision: Some(self.snapshots.revision()),
            payload: None,
        }
    }

    fn fail(
        &self,
        request_id: u64,
        now: u64,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> SurfaceResponse {
        SurfaceResponse {
            request_id,
            timestamp: now,
            status: CommandStatus::Failure,
            error_code: Some(code),
            message: Some(message.into()),
            snapshot_revision: None,
            payload: None,
        }
    }
}
