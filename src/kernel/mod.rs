//! The scan kernel: fixed-cadence deterministic evaluation engine.
//!
//! A single kernel thread owns all card runtime. Each cycle it
//!
//! 1. adopts a pending config swap (between scans only),
//! 2. drains the bounded command queue,
//! 3. latches inputs (forced values substituted),
//! 4. evaluates every enabled card in ascending card-id order,
//! 5. drives outputs through the masked-drive formula,
//! 6. publishes an immutable snapshot with the next revision,
//! 7. accounts the scan duration against the overrun budget.
//!
//! Scheduling is absolute (`lastScanStart += interval`), so cadence
//! does not drift unless overruns accumulate. Scan-internal faults
//! never halt the scheduler: they are recorded per card and through
//! the fault sink, and the scan runs to completion.
//!
//! STEP mode evaluates exactly one card per `step_once`; BREAKPOINT
//! mode halts before any card whose breakpoint flag is set. A paused
//! kernel republishes the last snapshot with the same revision and a
//! bumped heartbeat. Inputs are latched once at scan start, so a scan
//! suspended at a breakpoint resumes against identical samples.

pub mod commands;
pub mod exchange;
pub mod overrides;
pub mod program;
pub mod queue;
pub mod snapshot;

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::card::condition;
use crate::card::mission::MissionTiming;
use crate::card::{ai, di, math, mission, rtc};
use crate::card::{FamilyRuntime, Health};
use crate::config::{CardBehavior, FaultPolicy};
use crate::error::{ErrorCode, FaultKind, IoError};
use crate::ports::{
    AnalogInputAdapter, DigitalInputAdapter, DigitalOutputAdapter, FaultSink, TimeSource, WallClock,
};
use crate::ports::SyncState;

use commands::{
    CommandEnvelope, CommandResult, InputForce, KernelCommand, KernelEvent, RunMode,
};
use exchange::{SnapshotExchange, SnapshotReader};
use overrides::OverrideTable;
use program::{CardTiming, OperandSet, Program};
use snapshot::{CardDetail, CardSnapshot, Snapshot, SystemStatus, TestMode, FW_VERSION};

/// Capacity of the kernel → surface event ring.
const EVENT_QUEUE_DEPTH: usize = 64;

// ───────────────────────────────────────────────────────────────
// Hand-off and handles
// ───────────────────────────────────────────────────────────────

/// Mailbox through which the commit pipeline offers a validated
/// program. The kernel takes it at the next scan boundary; offering
/// again before adoption replaces the pending program.
#[derive(Clone, Default)]
pub struct ProgramMailbox {
    inner: Arc<Mutex<Option<Program>>>,
}

impl ProgramMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, program: Program) {
        *self.inner.lock() = Some(program);
    }

    fn take(&self) -> Option<Program> {
        self.inner.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().is_some()
    }
}

/// Everything the control surface needs to talk to a running kernel.
pub struct KernelHandles {
    /// Single producer into the bounded command queue.
    pub commands: queue::Producer<CommandEnvelope>,
    /// Command results and lifecycle events.
    pub events: queue::Consumer<KernelEvent>,
    pub snapshots: SnapshotReader,
    pub swap: ProgramMailbox,
}

// ───────────────────────────────────────────────────────────────
// Kernel
// ───────────────────────────────────────────────────────────────

/// Input sample latched at scan start.
#[derive(Debug, Clone, Copy)]
enum Latch {
    None,
    Digital(Result<bool, IoError>),
    Analog(Result<u32, IoError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanOutcome {
    Completed,
    AwaitingStep,
    HaltedAtBreakpoint,
}

pub struct ScanKernel {
    program: Program,
    overrides: OverrideTable,
    run_mode: RunMode,

    // Scan cursor state. A scan may span ticks in STEP/BREAKPOINT.
    scan_open: bool,
    cursor: usize,
    step_budget: u32,
    /// Position whose breakpoint is consumed by a `continue`.
    resume_at: Option<usize>,

    last_scan_start_us: Option<u64>,
    scan_started_us: u64,
    latched_wall: WallClock,
    input_latch: Vec<Latch>,

    revision: u64,
    heartbeat: u64,
    overrun_count: u32,
    last_scan_duration_us: u32,
    wifi_online: bool,

    commands: queue::Consumer<CommandEnvelope>,
    events: queue::Producer<KernelEvent>,
    exchange: SnapshotExchange,
    reader: SnapshotReader,
    mailbox: ProgramMailbox,
}

impl ScanKernel {
    /// Build a kernel around an initial program. The command queue
    /// capacity and drain budget come from the program's scan
    /// settings; the ring capacity is fixed for the kernel's lifetime.
    pub fn new(program: Program) -> (Self, KernelHandles) {
        let (cmd_tx, cmd_rx) = queue::bounded(program.settings.command_queue_depth as usize);
        let (evt_tx, evt_rx) = queue::bounded(EVENT_QUEUE_DEPTH);
        let exchange = SnapshotExchange::new(Snapshot::empty());
        let reader = exchange.reader();
        let mailbox = ProgramMailbox::new();

        let card_count = program.cards.len();
        let kernel = Self {
            overrides: OverrideTable::sized_for(card_count),
            program,
            run_mode: RunMode::Normal,
            scan_open: false,
            cursor: 0,
            step_budget: 0,
            resume_at: None,
            last_scan_start_us: None,
            scan_started_us: 0,
            latched_wall: WallClock {
                epoch_sec: 0,
                sync: SyncState::Invalid,
            },
            input_latch: vec![Latch::None; card_count],
            revision: 0,
            heartbeat: 0,
            overrun_count: 0,
            last_scan_duration_us: 0,
            wifi_online: false,
            commands: cmd_rx,
            events: evt_tx,
            exchange,
            reader: reader.clone(),
            mailbox: mailbox.clone(),
        };
        let handles = KernelHandles {
            commands: cmd_tx,
            events: evt_rx,
            snapshots: reader,
            swap: mailbox,
        };
        (kernel, handles)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn active_config_id(&self) -> &str {
        &self.program.envelope.config_id
    }

    /// WiFi link status is external; the platform reports it here for
    /// inclusion in snapshots.
    pub fn set_wifi_online(&mut self, online: bool) {
        self.wifi_online = online;
    }

    // ── Tick ──────────────────────────────────────────────────

    /// Advance the kernel. Runs at most one scan cycle per call; call
    /// again immediately to drain a backlog after a stall.
    pub fn tick<IO, TS, FS>(&mut self, io: &mut IO, clock: &TS, sink: &mut FS)
    where
        IO: DigitalInputAdapter + AnalogInputAdapter + DigitalOutputAdapter,
        TS: TimeSource,
        FS: FaultSink,
    {
        let now_us = clock.now_monotonic_us();
        let interval_us = self.program.settings.interval_ms as u64 * 1000;

        match self.last_scan_start_us {
            None => self.last_scan_start_us = Some(now_us),
            Some(last) => {
                if now_us.saturating_sub(last) < interval_us {
                    return;
                }
                let scheduled = last + interval_us;
                let deviation = now_us.saturating_sub(scheduled);
                if deviation > self.program.settings.jitter_budget_us as u64 {
                    debug!("scan start late by {deviation} us (budget exceeded)");
                }
                // Absolute schedule: drift-free unless overruns pile up.
                self.last_scan_start_us = Some(scheduled);
            }
        }

        self.cycle(io, clock, sink);
    }

    fn cycle<IO, TS, FS>(&mut self, io: &mut IO, clock: &TS, sink: &mut FS)
    where
        IO: DigitalInputAdapter + AnalogInputAdapter + DigitalOutputAdapter,
        TS: TimeSource,
        FS: FaultSink,
    {
        // Config swaps happen only between scans.
        if !self.scan_open {
            self.adopt_pending();
        }

        self.drain_commands();

        let outcome = self.run_scan(io, clock, sink);
        if outcome != ScanOutcome::Completed {
            self.publish_heartbeat();
        }
    }

    // ── Scan execution ────────────────────────────────────────

    fn run_scan<IO, TS, FS>(&mut self, io: &mut IO, clock: &TS, sink: &mut FS) -> ScanOutcome
    where
        IO: DigitalInputAdapter + AnalogInputAdapter + DigitalOutputAdapter,
        TS: TimeSource,
        FS: FaultSink,
    {
        if !self.scan_open {
            // STEP mode opens a scan only when a step is pending.
            if self.run_mode == RunMode::Step && self.step_budget == 0 {
                return ScanOutcome::AwaitingStep;
            }
            self.begin_scan(io, clock);
        }

        while self.cursor < self.program.cards.len() {
            if self.run_mode == RunMode::Breakpoint
                && self.overrides.get(self.cursor).breakpoint
                && self.resume_at != Some(self.cursor)
            {
                return ScanOutcome::HaltedAtBreakpoint;
            }
            if self.run_mode == RunMode::Step {
                if self.step_budget == 0 {
                    return ScanOutcome::AwaitingStep;
                }
                self.step_budget -= 1;
            }
            self.resume_at = None;
            self.eval_card(self.cursor, io, clock, sink);
            self.cursor += 1;
        }

        self.finish_scan(clock, sink);
        ScanOutcome::Completed
    }

    fn begin_scan<IO, TS>(&mut self, io: &mut IO, clock: &TS)
    where
        IO: DigitalInputAdapter + AnalogInputAdapter,
        TS: TimeSource,
    {
        self.scan_started_us = clock.now_monotonic_us();
        self.latched_wall = clock.wall_clock();
        self.latch_inputs(io);
        self.cursor = 0;
        self.scan_open = true;
    }

    /// Sample every physical input once. Forced values substitute for
    /// adapter reads; a scan suspended mid-way resumes on this latch.
    fn latch_inputs<IO>(&mut self, io: &mut IO)
    where
        IO: DigitalInputAdapter + AnalogInputAdapter,
    {
        for (pos, card) in self.program.cards.iter().enumerate() {
            self.input_latch[pos] = match &card.behavior {
                CardBehavior::Di(cfg) => match self.overrides.get(pos).force {
                    InputForce::ForcedHigh => Latch::Digital(Ok(true)),
                    InputForce::ForcedLow => Latch::Digital(Ok(false)),
                    _ => Latch::Digital(io.read_digital(cfg.channel)),
                },
                CardBehavior::Ai(cfg) => match self.overrides.get(pos).force {
                    InputForce::ForcedValue { value } => Latch::Analog(Ok(value)),
                    _ => Latch::Analog(io.read_analog(cfg.channel)),
                },
                _ => Latch::None,
            };
        }
    }

    fn eval_card<IO, TS, FS>(&mut self, pos: usize, io: &mut IO, clock: &TS, sink: &mut FS)
    where
        IO: DigitalOutputAdapter,
        TS: TimeSource,
        FS: FaultSink,
    {
        if !self.program.cards[pos].enabled {
            return;
        }
        let started_us = clock.now_monotonic_us();

        // Condition and operand reads see the in-progress scan: cards
        // already visited this scan expose fresh values, later cards
        // their previous-scan values.
        let (set_block, reset_block) = {
            let card = &self.program.cards[pos];
            card.condition_blocks()
        };
        let set_ok = condition::eval_set(set_block, &self.program);
        let reset_ok = condition::eval_reset(reset_block, &self.program);

        let operand_inputs = match self.program.cards[pos].operands {
            OperandSet::Standard { a, b } => {
                Some((self.program.operand_value(a), self.program.operand_value(b)))
            }
            OperandSet::Pid { setpoint, process } => Some((
                self.program.operand_value(setpoint),
                self.program.operand_value(process),
            )),
            OperandSet::None => None,
        };

        let latch = self.input_latch[pos];
        let local_mask = self.overrides.get(pos).masked;
        let global_mask = self.overrides.output_mask_global;
        let interval_ms = self.program.settings.interval_ms;
        let wall = self.latched_wall;

        let card = &mut self.program.cards[pos];
        card.common.clear_transient();
        let mut fault: Option<(FaultKind, &'static str)> = None;

        match (&card.behavior, &mut card.runtime) {
            (CardBehavior::Di(cfg), FamilyRuntime::Di(rt)) => {
                let debounce_scans = match card.timing {
                    CardTiming::Di { debounce_scans } => debounce_scans,
                    _ => 1,
                };
                let raw = match latch {
                    Latch::Digital(Ok(sample)) => sample,
                    Latch::Digital(Err(_)) => {
                        fault = Some((FaultKind::InputRead, "digital read failed"));
                        // Hold the previous sample on a bad read.
                        rt.physical_state ^ cfg.invert
                    }
                    _ => rt.physical_state ^ cfg.invert,
                };
                di::evaluate(cfg, rt, raw, set_ok, reset_ok, debounce_scans);
            }

            (CardBehavior::Ai(cfg), FamilyRuntime::Ai(rt)) => {
                let sample = match latch {
                    Latch::Analog(result) => result,
                    _ => Err(IoError::ReadFailed),
                };
                ai::evaluate(cfg, rt, sample);
                if rt.quality == ai::Quality::Invalid {
                    fault = Some((FaultKind::InputRead, "analog read failed"));
                }
            }

            (CardBehavior::Sio(cfg), FamilyRuntime::Sio(rt)) => {
                let timing = mission_timing(card.timing);
                mission::evaluate(&cfg.mission, &timing, rt, set_ok, reset_ok);
            }

            (CardBehavior::Do(cfg), FamilyRuntime::Do(rt)) => {
                let timing = mission_timing(card.timing);
                mission::evaluate(&cfg.mission, &timing, &mut rt.mission, set_ok, reset_ok);

                let masked = global_mask || local_mask;
                rt.physical_drive = if card.common.latched {
                    // Critical fault latched: hold the configured safe level.
                    cfg.safe_drive
                } else {
                    rt.mission.physical_state && !masked
                };
                if io.write_digital(cfg.channel, rt.physical_drive).is_err() {
                    fault = Some((FaultKind::OutputWrite, "digital write failed"));
                }
            }

            (CardBehavior::Math(cfg), FamilyRuntime::Math(rt)) => {
                let (a, b) = operand_inputs.unwrap_or((None, None));
                let faulted = match cfg.mode {
                    math::MathMode::StandardPipeline => cfg.standard.as_ref().is_some_and(|std| {
                        math::evaluate_standard(
                            std,
                            cfg.fallback_value,
                            rt,
                            a,
                            b,
                            set_ok,
                            reset_ok,
                            interval_ms,
                        )
                    }),
                    math::MathMode::Pid => cfg.pid.as_ref().is_some_and(|pid| {
                        math::evaluate_pid(
                            pid,
                            cfg.fallback_value,
                            rt,
                            a,
                            b,
                            set_ok,
                            reset_ok,
                            interval_ms,
                        )
                    }),
                };
                if faulted {
                    fault = Some((FaultKind::MathDomain, "calculation fault"));
                }
            }

            (CardBehavior::Rtc(cfg), FamilyRuntime::Rtc(rt)) => {
                if rtc::evaluate(cfg, rt, wall) {
                    fault = Some((FaultKind::TimeUnsynced, "wall clock not synced"));
                }
            }

            // Behavior and runtime variants are constructed together;
            // a mismatch cannot occur in a compiled program.
            _ => {}
        }

        if let Some((kind, detail)) = fault {
            let (health, latch_fault) = match card.fault_policy {
                FaultPolicy::Info => (Health::Ok, false),
                FaultPolicy::Warn => (Health::Warn, false),
                FaultPolicy::Critical => (Health::Fault, true),
            };
            card.common.record_fault(health, latch_fault);
            sink.record(kind, Some(card.id), detail);
        }

        card.common.last_eval_us = clock.now_monotonic_us().saturating_sub(started_us) as u32;
    }

    fn finish_scan<TS, FS>(&mut self, clock: &TS, sink: &mut FS)
    where
        TS: TimeSource,
        FS: FaultSink,
    {
        self.scan_open = false;
        self.cursor = 0;
        self.resume_at = None;

        let duration_us =
            clock.now_monotonic_us().saturating_sub(self.scan_started_us) as u32;
        self.last_scan_duration_us = duration_us;
        if duration_us > self.program.settings.overrun_budget_us {
            self.overrun_count = self.overrun_count.saturating_add(1);
            warn!(
                "scan overrun: {duration_us} us against a {} us budget",
                self.program.settings.overrun_budget_us
            );
            sink.record(FaultKind::ScanOverrun, None, "scan exceeded overrun budget");
        }

        self.revision += 1;
        self.heartbeat += 1;
        let snapshot = self.build_snapshot();
        self.exchange.publish(snapshot);
    }

    /// Republish the last snapshot unchanged apart from the heartbeat,
    /// so observers can tell a paused kernel from a dead one.
    fn publish_heartbeat(&mut self) {
        self.heartbeat += 1;
        let mut snapshot = (*self.reader.latest()).clone();
        snapshot.heartbeat = self.heartbeat;
        self.exchange.publish(snapshot);
    }

    fn build_snapshot(&self) -> Snapshot {
        let mut snapshot = self
            .exchange
            .take_recycled()
            .unwrap_or_else(Snapshot::empty);
        snapshot.revision = self.revision;
        snapshot.heartbeat = self.heartbeat;
        snapshot.timestamp_ms = self.latched_wall.epoch_sec * 1000;
        snapshot.scan_interval_ms = self.program.settings.interval_ms;
        snapshot.run_mode = self.run_mode;
        snapshot.scan_duration_us = self.last_scan_duration_us;
        snapshot.overrun_count = self.overrun_count;
        snapshot.test_mode = TestMode {
            output_mask_global: self.overrides.output_mask_global,
            inputs_forced: self.overrides.any_force_active(),
        };
        snapshot.system = SystemStatus {
            alarm_active: self
                .program
                .cards
                .iter()
                .any(|card| card.common.health == Health::Fault),
            wifi_online: self.wifi_online,
            fw_version: FW_VERSION.to_string(),
        };

        snapshot.cards.clear();
        snapshot.cards.reserve(self.program.cards.len());
        for (pos, card) in self.program.cards.iter().enumerate() {
            let masked = self.overrides.get(pos).masked || self.overrides.output_mask_global;
            let detail = match &card.runtime {
                FamilyRuntime::Di(rt) => CardDetail::Di {
                    logical_state: rt.logical_state,
                    physical_state: rt.physical_state,
                    trigger_flag: rt.trigger_flag,
                    current_value: rt.current_value,
                    filter_state: rt.filter_state,
                },
                FamilyRuntime::Ai(rt) => CardDetail::Ai {
                    current_value: rt.current_value,
                    quality: rt.quality,
                },
                FamilyRuntime::Sio(rt) => CardDetail::Sio {
                    logical_state: rt.logical_state,
                    physical_state: rt.physical_state,
                    mission_state: rt.mission_state(),
                    current_value: rt.current_value,
                },
                FamilyRuntime::Do(rt) => CardDetail::Do {
                    logical_state: rt.mission.logical_state,
                    physical_state: rt.mission.physical_state,
                    mission_state: rt.mission.mission_state(),
                    current_value: rt.mission.current_value,
                    physical_drive: rt.physical_drive,
                    masked,
                },
                FamilyRuntime::Math(rt) => CardDetail::Math {
                    current_value: rt.current_value,
                    intermediate_value: rt.intermediate_value,
                    fault_status: rt.fault,
                },
                FamilyRuntime::Rtc(rt) => CardDetail::Rtc {
                    logical_state: rt.logical_state,
                    time_until_next_start_sec: rt.time_until_next_start_sec,
                    time_until_next_end_sec: rt.time_until_next_end_sec,
                },
            };
            snapshot.cards.push(CardSnapshot {
                card_id: card.id,
                enabled: card.enabled,
                health: card.common.health,
                last_eval_us: card.common.last_eval_us,
                fault_count: card.common.fault_count,
                detail,
            });
        }
        snapshot
    }

    // ── Commands ──────────────────────────────────────────────

    fn drain_commands(&mut self) {
        let budget = self.program.settings.command_drain_per_tick;
        for _ in 0..budget {
            let Some(envelope) = self.commands.pop() else {
                break;
            };
            let result = self.apply_command(envelope);
            self.emit(KernelEvent::CommandResult(result));
        }
    }

    fn apply_command(&mut self, envelope: CommandEnvelope) -> CommandResult {
        let request_id = envelope.request_id;
        match envelope.command {
            KernelCommand::SetRunMode(mode) => {
                if mode != self.run_mode {
                    info!("run mode {:?} -> {:?}", self.run_mode, mode);
                    self.run_mode = mode;
                    self.step_budget = 0;
                    self.resume_at = None;
                }
                CommandResult::success(request_id, self.revision)
            }

            KernelCommand::StepOnce => {
                if self.run_mode != RunMode::Step {
                    return CommandResult::failure(
                        request_id,
                        ErrorCode::ForbiddenInMode,
                        "step_once requires STEP mode",
                    );
                }
                self.step_budget = self.step_budget.saturating_add(1);
                CommandResult::success(request_id, self.revision)
            }

            KernelCommand::Continue => {
                if self.run_mode != RunMode::Breakpoint || !self.scan_open {
                    return CommandResult::failure(
                        request_id,
                        ErrorCode::ForbiddenInMode,
                        "continue requires a halted breakpoint",
                    );
                }
                self.resume_at = Some(self.cursor);
                CommandResult::success(request_id, self.revision)
            }

            KernelCommand::SetBreakpoint { card_id, enabled } => {
                let Some(pos) = self.program.index_of(card_id) else {
                    return CommandResult::failure(
                        request_id,
                        ErrorCode::NotFound,
                        format!("no card {card_id}"),
                    );
                };
                if let Some(entry) = self.overrides.get_mut(pos) {
                    entry.breakpoint = enabled;
                }
                CommandResult::success(request_id, self.revision)
            }

            KernelCommand::SetInputForce { card_id, force } => {
                let Some(pos) = self.program.index_of(card_id) else {
                    return CommandResult::failure(
                        request_id,
                        ErrorCode::NotFound,
                        format!("no card {card_id}"),
                    );
                };
                let valid = matches!(
                    (&self.program.cards[pos].behavior, force),
                    (
                        CardBehavior::Di(_),
                        InputForce::Real | InputForce::ForcedHigh | InputForce::ForcedLow
                    ) | (
                        CardBehavior::Ai(_),
                        InputForce::Real | InputForce::ForcedValue { .. }
                    )
                );
                if !valid {
                    return CommandResult::failure(
                        request_id,
                        ErrorCode::InvalidRequest,
                        "force mode does not fit the card family",
                    );
                }
                if let Some(entry) = self.overrides.get_mut(pos) {
                    entry.force = force;
                }
                // Prime the DI edge detector so the force transition
                // itself never reads as a qualified edge.
                let card = &mut self.program.cards[pos];
                if let (CardBehavior::Di(cfg), FamilyRuntime::Di(rt)) =
                    (&card.behavior, &mut card.runtime)
                {
                    let raw = match force {
                        InputForce::ForcedHigh => true,
                        InputForce::ForcedLow => false,
                        _ => rt.physical_state ^ cfg.invert,
                    };
                    rt.prime(cfg, raw);
                }
                CommandResult::success(request_id, self.revision)
            }

            KernelCommand::SetOutputMask { card_id, masked } => {
                let Some(pos) = self.program.index_of(card_id) else {
                    return CommandResult::failure(
                        request_id,
                        ErrorCode::NotFound,
                        format!("no card {card_id}"),
                    );
                };
                match &self.program.cards[pos].behavior {
                    CardBehavior::Do(_) => {}
                    CardBehavior::Sio(cfg)
                        if cfg.write_policy == mission::WritePolicy::ReadWrite => {}
                    CardBehavior::Sio(_) => {
                        return CommandResult::failure(
                            request_id,
                            ErrorCode::Forbidden,
                            "card is read-only",
                        );
                    }
                    _ => {
                        return CommandResult::failure(
                            request_id,
                            ErrorCode::InvalidRequest,
                            "card has no maskable output",
                        );
                    }
                }
                if let Some(entry) = self.overrides.get_mut(pos) {
                    entry.masked = masked;
                }
                CommandResult::success(request_id, self.revision)
            }

            KernelCommand::SetOutputMaskGlobal { masked } => {
                self.overrides.output_mask_global = masked;
                CommandResult::success(request_id, self.revision)
            }

            KernelCommand::AckFaults { card_id } => {
                match card_id {
                    Some(id) => {
                        let Some(pos) = self.program.index_of(id) else {
                            return CommandResult::failure(
                                request_id,
                                ErrorCode::NotFound,
                                format!("no card {id}"),
                            );
                        };
                        self.program.cards[pos].common.acknowledge();
                    }
                    None => {
                        for card in &mut self.program.cards {
                            card.common.acknowledge();
                        }
                    }
                }
                CommandResult::success(request_id, self.revision)
            }
        }
    }

    fn emit(&mut self, event: KernelEvent) {
        if self.events.push(event).is_err() {
            warn!("kernel event dropped: event ring full");
        }
    }

    // ── Config swap ───────────────────────────────────────────

    fn adopt_pending(&mut self) {
        let Some(mut next) = self.mailbox.take() else {
            return;
        };
        next.adopt_runtime(&self.program);
        self.overrides = self
            .overrides
            .carry_over(&self.program.card_ids(), &next.card_ids());
        self.input_latch = vec![Latch::None; next.cards.len()];

        info!(
            "adopted config '{}' with {} cards",
            next.envelope.config_id,
            next.cards.len()
        );
        let config_id = next.envelope.config_id.clone();
        self.program = next;
        self.emit(KernelEvent::ConfigAdopted {
            config_id,
            revision: self.revision,
        });
    }
}

fn mission_timing(timing: CardTiming) -> MissionTiming {
    match timing {
        CardTiming::Mission(t) => t,
        _ => MissionTiming {
            delay_scans: 0,
            on_scans: None,
        },
    }
}
