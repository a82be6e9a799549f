use actuator_core::hal::RadioChannel;
use defmt::{Debug2Format, warn};
use embassy_stm32::usart::BufferedUartRx;
use embassy_time::{Duration, Timer, with_timeout};
use embedded_io_async::Read;

use crate::board::SharedHandoff;
use crate::handoff::FrameAssembler;

/// Line silence that ends a frame sent without a terminator.
const FRAME_IDLE_GAP: Duration = Duration::from_millis(5);
const READ_CHUNK: usize = 16;

#[embassy_executor::task(pool_size = 2)]
pub async fn run(
    channel: RadioChannel,
    mut rx: BufferedUartRx<'static>,
    handoff: &'static SharedHandoff,
) -> ! {
    let mut assembler = FrameAssembler::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        match with_timeout(FRAME_IDLE_GAP, rx.read(&mut chunk)).await {
            Ok(Ok(count)) => {
                for byte in &chunk[..count] {
                    if let Some(frame) = assembler.push(*byte) {
                        handoff.publish_frame(channel, frame);
                    }
                }
            }
            Ok(Err(error)) => {
                warn!("radio {}: read error {}", channel.label(), Debug2Format(&error));
                Timer::after(Duration::from_millis(5)).await;
            }
            Err(_) => {
                if let Some(frame) = assembler.flush() {
                    handoff.publish_frame(channel, frame);
                }
            }
        }
    }
}
