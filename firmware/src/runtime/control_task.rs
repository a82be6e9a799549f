use actuator_core::Controller;
use defmt::info;
use embassy_time::{Duration, Ticker};

use crate::board::{Board, SharedHandoff};
use crate::instant::FirmwareInstant;
use crate::telemetry::{TelemetryDrain, log_record};

/// Periodic control loop. Once the sleep sequence raises the low-power flag
/// and the axis is idle with no sequence in flight, the loop dozes until a
/// frame or manual trigger arrives.
#[embassy_executor::task]
pub async fn run(
    mut controller: Controller<FirmwareInstant>,
    mut board: Board,
    handoff: &'static SharedHandoff,
) -> ! {
    let mut drain = TelemetryDrain::new();
    controller.start(&mut board, FirmwareInstant::now());
    info!(
        "control: calibrated={} target={}",
        controller.calibration().is_calibrated,
        controller.calibration().target_sum
    );

    let period = controller.config().tick_period;
    let period_us = u64::try_from(period.as_micros()).unwrap_or(u64::MAX);
    let mut ticker = Ticker::every(Duration::from_micros(period_us));

    loop {
        let report = controller.tick(&mut board, FirmwareInstant::now());
        drain.drain(controller.telemetry(), log_record);

        if handoff.take_doze(&report) {
            info!("control: dozing until the next frame or trigger");
            handoff.reset_wake();
            if !handoff.input_pending() {
                handoff.wait_for_wake().await;
            }
            controller.wake(FirmwareInstant::now());
            info!("control: awake");
            ticker.reset();
        }

        ticker.next().await;
    }
}
