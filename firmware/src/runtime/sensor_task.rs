use defmt::{Debug2Format, warn};
use embassy_stm32::usart::BufferedUartRx;
use embassy_time::{Duration, Timer};
use embedded_io_async::Read;

use crate::board::SharedHandoff;
use crate::imu::{PACKET_LEN, PacketDecoder};
use crate::motor::ReplyDecoder;

const READ_BACKOFF: Duration = Duration::from_millis(5);

/// Streams yaw samples from the attitude sensor into the handoff.
#[embassy_executor::task]
pub async fn yaw(mut rx: BufferedUartRx<'static>, handoff: &'static SharedHandoff) -> ! {
    let mut decoder = PacketDecoder::new();
    let mut chunk = [0u8; PACKET_LEN];

    loop {
        match rx.read(&mut chunk).await {
            Ok(count) => {
                for byte in &chunk[..count] {
                    if let Some(sample) = decoder.push(*byte) {
                        handoff.yaw.publish(sample.yaw);
                    }
                }
            }
            Err(error) => {
                warn!("imu: read error {}", Debug2Format(&error));
                Timer::after(READ_BACKOFF).await;
            }
        }
    }
}

/// Collects bus-current replies from the motor driver.
#[embassy_executor::task]
pub async fn bus_current(
    mut rx: BufferedUartRx<'static>,
    axis: u8,
    handoff: &'static SharedHandoff,
) -> ! {
    let mut decoder = ReplyDecoder::new(axis);
    let mut chunk = [0u8; 8];

    loop {
        match rx.read(&mut chunk).await {
            Ok(count) => {
                for byte in &chunk[..count] {
                    if let Some(amperes) = decoder.push(*byte) {
                        handoff.bus_current.publish(amperes);
                    }
                }
            }
            Err(error) => {
                warn!("motor: read error {}", Debug2Format(&error));
                Timer::after(READ_BACKOFF).await;
            }
        }
    }
}
