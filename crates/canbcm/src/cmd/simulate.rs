use std::sync::Arc;
use std::time::Duration;

use canbcm_frame::{BcmMessage, Flags, MsgHead, Opcode, Timeval};
use canbcm_manager::{BcmConfig, BcmSocket};
use canbcm_transport::{CanFrame, CanId, VirtualBus};
use tracing::info;

use crate::cmd::parse::{parse_can_id, parse_data, parse_duration, parse_interval};
use crate::cmd::SimulateArgs;
use crate::exit::{bcm_error, io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_delivery, print_report, OutputFormat};

const INTERFACE: &str = "vcan0";

/// Everything the simulation needs, parsed up front.
#[derive(Debug)]
struct Plan {
    config: BcmConfig,
    tx_setup: BcmMessage,
    rx_setup: BcmMessage,
    run_for: Duration,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let plan = plan(&args)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(simulate(plan, format))
}

fn plan(args: &SimulateArgs) -> CliResult<Plan> {
    let can_id = parse_can_id(&args.can_id)?;
    if args.data.is_empty() {
        return Err(CliError::usage("at least one payload is required"));
    }
    let frames = args
        .data
        .iter()
        .map(|data| frame(can_id, &parse_data(data)?))
        .collect::<CliResult<Vec<_>>>()?;

    let ival1 = Timeval::from_duration(parse_interval(&args.ival1)?);
    let ival2 = Timeval::from_duration(parse_interval(&args.ival2)?);
    let mut tx_flags = Flags::SET_TIMER | Flags::START_TIMER;
    if args.count > 0 {
        tx_flags |= Flags::TX_COUNT_EVENT;
    }
    let tx_setup = BcmMessage::new(MsgHead::new(Opcode::TxSetup, can_id), frames)
        .with_flags(tx_flags)
        .with_timers(args.count, ival1, ival2);

    let rx_frames = match &args.mask {
        Some(mask) => vec![frame(can_id, &parse_data(mask)?)?],
        None => Vec::new(),
    };
    let timeout = args
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(Timeval::from_duration)
        .unwrap_or(Timeval::ZERO);
    let throttle = args
        .throttle
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(Timeval::from_duration)
        .unwrap_or(Timeval::ZERO);
    let mut rx_flags = Flags::empty();
    if !timeout.is_zero() || !throttle.is_zero() {
        rx_flags |= Flags::SET_TIMER;
    }
    if !timeout.is_zero() {
        rx_flags |= Flags::START_TIMER;
    }
    let rx_setup = BcmMessage::new(MsgHead::new(Opcode::RxSetup, can_id), rx_frames)
        .with_flags(rx_flags)
        .with_timers(0, timeout, throttle);

    let config = BcmConfig {
        tick_hz: args.tick_hz,
        notify_queue_depth: args.queue_depth,
        ..BcmConfig::default()
    };
    config
        .validate()
        .map_err(|err| bcm_error("invalid configuration", err))?;

    Ok(Plan {
        config,
        tx_setup,
        rx_setup,
        run_for: parse_duration(&args.duration)?,
    })
}

fn frame(can_id: CanId, payload: &[u8]) -> CliResult<CanFrame> {
    CanFrame::new(can_id, payload).map_err(|err| transport_error("invalid payload", err))
}

async fn simulate(plan: Plan, format: OutputFormat) -> CliResult<i32> {
    let bus = Arc::new(VirtualBus::new());
    let ifindex = bus
        .add_interface(INTERFACE)
        .map_err(|err| transport_error("interface setup failed", err))?;

    let mut sender = open_socket(&bus, &plan.config)?;
    let mut watcher = open_socket(&bus, &plan.config)?;
    sender
        .connect(ifindex)
        .map_err(|err| bcm_error("connect failed", err))?;
    watcher
        .connect(ifindex)
        .map_err(|err| bcm_error("connect failed", err))?;

    watcher
        .send(&plan.rx_setup)
        .map_err(|err| bcm_error("RX_SETUP failed", err))?;
    sender
        .send(&plan.tx_setup)
        .map_err(|err| bcm_error("TX_SETUP failed", err))?;
    info!(
        interface = INTERFACE,
        can_id = %plan.tx_setup.head.can_id,
        run_for = ?plan.run_for,
        "simulation started"
    );

    let stop = tokio::time::sleep(plan.run_for);
    tokio::pin!(stop);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut delivered = 0usize;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            Some(delivery) = watcher.recv() => {
                print_delivery(&delivery, "rx", format);
                delivered += 1;
            }
            Some(delivery) = sender.recv() => {
                print_delivery(&delivery, "tx", format);
                delivered += 1;
            }
        }
    }

    print_report(&sender.report(), "tx", format);
    print_report(&watcher.report(), "rx", format);
    info!(
        notifications = delivered,
        frames_sent = bus.sent_frames(ifindex).len(),
        "simulation finished"
    );
    sender.close();
    watcher.close();
    Ok(SUCCESS)
}

fn open_socket(bus: &Arc<VirtualBus>, config: &BcmConfig) -> CliResult<BcmSocket> {
    BcmSocket::open(bus.clone(), config.clone()).map_err(|err| bcm_error("socket setup failed", err))
}
