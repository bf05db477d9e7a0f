//! One worker per dispatched action: own the driver, take the
//! reading, queue the data, book the energy, finish the action.
//!
//! The termination token is observed before the driver is entered and
//! between the steps of the reporting flow; a worker that sees it
//! aborts its action and exits without touching the driver again.

use std::sync::Arc;

use log::{debug, warn};

use super::{
    lock, CancelToken, Drivers, Node, SharedBle, SharedCellular, SharedEnvironment, SharedLight,
    SharedMagnetic, SharedMotion, SharedPosition,
};
use crate::action::{ActionId, ActionType};
use crate::codec::Reporter;
use crate::driver::{DriverError, EnergyTier, PowerSupervisor};
use crate::journal::Event;
use crate::record::{DataFlags, Payload};

pub(super) struct WorkerCtx {
    pub node: Arc<Node>,
    pub cancel: CancelToken,
    pub power: Arc<dyn PowerSupervisor>,
    pub device_name: Option<String>,
    pub server_address: String,
    pub server_port: u16,
    pub encode_buffer_len: usize,
}

/// The driver a worker owns for the cycle.
pub(super) enum WorkerDriver {
    Environment(SharedEnvironment),
    Light(SharedLight),
    Motion(SharedMotion),
    Position(SharedPosition),
    Magnetic(SharedMagnetic),
    Ble(SharedBle),
    Cellular { cell: SharedCellular, with_time: bool },
}

pub(super) fn driver_for(drivers: &Drivers, ty: ActionType) -> Option<WorkerDriver> {
    Some(match ty {
        ActionType::Report => WorkerDriver::Cellular {
            cell: drivers.cellular.clone()?,
            with_time: false,
        },
        ActionType::GetTimeAndReport => WorkerDriver::Cellular {
            cell: drivers.cellular.clone()?,
            with_time: true,
        },
        ActionType::MeasureHumidity
        | ActionType::MeasurePressure
        | ActionType::MeasureTemperature => WorkerDriver::Environment(drivers.environment.clone()?),
        ActionType::MeasureLight => WorkerDriver::Light(drivers.light.clone()?),
        ActionType::MeasureOrientation => WorkerDriver::Motion(drivers.motion.clone()?),
        ActionType::MeasurePosition => WorkerDriver::Position(drivers.position.clone()?),
        ActionType::MeasureMagnetic => WorkerDriver::Magnetic(drivers.magnetic.clone()?),
        ActionType::MeasureBle => WorkerDriver::Ble(drivers.ble.clone()?),
    })
}

/// Flags a fresh record of this action's kind starts with. Position
/// fixes are expensive to obtain, so they are not dropped until the
/// server has confirmed them.
fn record_flags(ty: ActionType) -> DataFlags {
    match ty {
        ActionType::MeasurePosition => DataFlags::REQUIRES_ACK,
        _ => DataFlags::empty(),
    }
}

pub(super) fn run(ctx: WorkerCtx, ty: ActionType, action: ActionId, driver: WorkerDriver) {
    // Waiting for the driver mutex is a suspension point: a worker
    // queued behind a slow sibling must notice the signal as soon as
    // it gets through, before touching the hardware.
    macro_rules! bail_if_cancelled {
        () => {
            if ctx.cancel.is_cancelled() {
                ctx.node.abort_action(action);
                ctx.node.log_event(Event::ActionAborted, ty.index() as u32);
                return;
            }
        };
    }

    bail_if_cancelled!();
    lock(&ctx.node.registry).start(action);
    ctx.node.log_event(Event::ActionStarted, ty.index() as u32);

    let (payload, energy_nwh) = match driver {
        WorkerDriver::Environment(dev) => {
            let mut dev = lock(&dev);
            bail_if_cancelled!();
            let reading = match ty {
                ActionType::MeasureHumidity => dev.read_humidity().map(Payload::Humidity),
                ActionType::MeasurePressure => dev.read_pressure().map(Payload::Pressure),
                _ => dev.read_temperature().map(Payload::Temperature),
            };
            (reading, dev.energy_cost_nwh())
        }
        WorkerDriver::Light(dev) => {
            let mut dev = lock(&dev);
            bail_if_cancelled!();
            (dev.read_light().map(Payload::Light), dev.energy_cost_nwh())
        }
        WorkerDriver::Motion(dev) => {
            let mut dev = lock(&dev);
            bail_if_cancelled!();
            (
                dev.read_acceleration().map(Payload::Acceleration),
                dev.energy_cost_nwh(),
            )
        }
        WorkerDriver::Position(dev) => {
            let mut dev = lock(&dev);
            bail_if_cancelled!();
            lock(&ctx.node.stats).inc_position_attempts();
            let fix = dev.read_fix();
            let energy = dev.energy_cost_nwh();
            drop(dev);
            let reading = fix.map(|f| {
                let mut stats = lock(&ctx.node.stats);
                stats.inc_position_success();
                stats.set_last_svs(f.svs_visible);
                Payload::Position(f.position)
            });
            (reading, energy)
        }
        WorkerDriver::Magnetic(dev) => {
            let mut dev = lock(&dev);
            bail_if_cancelled!();
            (
                dev.read_field_strength().map(Payload::Magnetic),
                dev.energy_cost_nwh(),
            )
        }
        WorkerDriver::Ble(dev) => {
            let mut dev = lock(&dev);
            bail_if_cancelled!();
            (dev.read_device().map(Payload::Ble), dev.energy_cost_nwh())
        }
        WorkerDriver::Cellular { cell, with_time } => {
            let energy = report_flow(&ctx, action, &cell, with_time);
            ctx.node.complete_action(action, energy);
            ctx.node.log_event(Event::ActionCompleted, ty.index() as u32);
            return;
        }
    };

    match payload {
        Ok(payload) => {
            if ctx
                .node
                .alloc_data(Some(action), record_flags(ty), &payload)
                .is_none()
            {
                ctx.node.log_event(Event::DataAllocFailed, ty.index() as u32);
                debug!("no room to queue {:?} data", ty);
            }
        }
        Err(e) => {
            // The action still completes: the attempt was made and the
            // energy spent, there is just nothing to report.
            warn!("{:?} driver: {}", ty, e);
            ctx.node.log_event(Event::DriverFailed, ty.index() as u32);
        }
    }

    ctx.node.complete_action(action, energy_nwh);
    ctx.node.log_event(Event::ActionCompleted, ty.index() as u32);
}

// Connect, optionally fetch time, snapshot the statistics and hand the
// reporter to the modem. Returns the energy cost of the session.
fn report_flow(ctx: &WorkerCtx, action: ActionId, cell: &SharedCellular, with_time: bool) -> u64 {
    let cancel = ctx.cancel.clone();
    let power = ctx.power.clone();
    let mut keep_going = move || !cancel.is_cancelled() && power.tier() >= EnergyTier::Bearable;

    let mut cell = lock(cell);
    if ctx.cancel.is_cancelled() {
        return 0;
    }

    lock(&ctx.node.stats).inc_connection_attempts();
    if let Err(e) = cell.connect(&mut keep_going) {
        warn!("connect: {}", e);
        ctx.node.log_event(Event::ConnectFailed, 0);
        return cell.energy_cost_nwh();
    }
    lock(&ctx.node.stats).inc_connection_success();

    if with_time && !ctx.cancel.is_cancelled() {
        match cell.get_time() {
            Ok(t) => {
                ctx.node.set_time(t);
                ctx.node.log_event(Event::TimeAdjusted, t.max(0) as u32);
            }
            Err(e) => warn!("get_time: {}", e),
        }
    }

    let name = match &ctx.device_name {
        Some(name) => name.clone(),
        None => match cell.imei() {
            Ok(imei) => imei.to_string(),
            Err(e) => {
                warn!("imei: {}", e);
                String::new()
            }
        },
    };

    if ctx.cancel.is_cancelled() {
        return cell.energy_cost_nwh();
    }

    // Radio conditions and the current statistics ride along with the
    // report.
    match cell.network_info() {
        Ok(info) => {
            ctx.node
                .alloc_data(Some(action), DataFlags::empty(), &Payload::Cellular(info));
        }
        Err(e) => debug!("network_info: {}", e),
    }
    let snapshot = lock(&ctx.node.stats).snapshot();
    ctx.node
        .alloc_data(Some(action), DataFlags::empty(), &Payload::Statistics(snapshot));

    let mut reporter = Reporter::new(&ctx.node, &name, ctx.encode_buffer_len);
    reporter.prepare();
    match cell.send_reports(&ctx.server_address, ctx.server_port, &mut reporter, &mut keep_going) {
        Ok(totals) => {
            let mut stats = lock(&ctx.node.stats);
            stats.add_transmitted(totals.bytes_transmitted);
            stats.add_received(totals.bytes_received);
            drop(stats);
            ctx.node.log_event(Event::ReportsSent, totals.reports_sent);
        }
        Err(DriverError::AckTimeout) => {
            // Records stay queued; next cycle retransmits them.
            debug!("ack timeout, data stays queued");
        }
        Err(e) => warn!("send_reports: {}", e),
    }

    cell.energy_cost_nwh()
}
