use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt::{Debug2Format, error, info};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::usart::{self, BufferedUart, Config as UartConfig, Uart};
use static_cell::StaticCell;

use actuator_core::config::ControllerConfig;
use actuator_core::hal::RadioChannel;
use actuator_core::Controller;

use crate::board::{Board, Outputs, Peripherals, SharedHandoff};
use crate::calibration::FlashCalibrationStore;
use crate::handoff::Handoff;
use crate::instant::FirmwareInstant;

mod control_task;
mod radio_task;
mod sensor_task;
mod trigger_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

const RADIO_BAUD: u32 = 9_600;
const IMU_BAUD: u32 = 9_600;
const MOTOR_BAUD: u32 = 115_200;
const RANGING_BAUD: u32 = 115_200;
const UART_BUFFER_SIZE: usize = 64;

type UartBuffer = [u8; UART_BUFFER_SIZE];

pub(super) static HANDOFF: SharedHandoff = Handoff::new();

static LORA_TX: StaticCell<UartBuffer> = StaticCell::new();
static LORA_RX: StaticCell<UartBuffer> = StaticCell::new();
static BLE_TX: StaticCell<UartBuffer> = StaticCell::new();
static BLE_RX: StaticCell<UartBuffer> = StaticCell::new();
static IMU_TX: StaticCell<UartBuffer> = StaticCell::new();
static IMU_RX: StaticCell<UartBuffer> = StaticCell::new();
static MOTOR_TX: StaticCell<UartBuffer> = StaticCell::new();
static MOTOR_RX: StaticCell<UartBuffer> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct Irqs {
    USART1 => usart::BufferedInterruptHandler<hal::peripherals::USART1>;
    USART2_LPUART2 => usart::BufferedInterruptHandler<hal::peripherals::USART2>;
    USART3_4_5_6_LPUART1 =>
        usart::BufferedInterruptHandler<hal::peripherals::USART3>,
        usart::BufferedInterruptHandler<hal::peripherals::USART4>;
});

fn uart_config(baudrate: u32) -> UartConfig {
    let mut config = UartConfig::default();
    config.baudrate = baudrate;
    config
}

fn buffers(
    tx: &'static StaticCell<UartBuffer>,
    rx: &'static StaticCell<UartBuffer>,
) -> (&'static mut UartBuffer, &'static mut UartBuffer) {
    (tx.init([0; UART_BUFFER_SIZE]), rx.init([0; UART_BUFFER_SIZE]))
}

/// Parks the executor after a fatal init error so the log stays readable.
async fn halt(what: &'static str, cause: impl core::fmt::Debug) -> ! {
    error!("init: {} failed: {}", what, Debug2Format(&cause));
    loop {
        core::future::pending::<()>().await;
    }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let p = hal::init(hal::Config::default());

    let (tx, rx) = buffers(&LORA_TX, &LORA_RX);
    let lora = match BufferedUart::new(p.USART1, p.PA10, p.PA9, tx, rx, Irqs, uart_config(RADIO_BAUD)) {
        Ok(uart) => uart,
        Err(cause) => halt("long-range UART", cause).await,
    };
    let (tx, rx) = buffers(&BLE_TX, &BLE_RX);
    let ble = match BufferedUart::new(p.USART2, p.PA3, p.PA2, tx, rx, Irqs, uart_config(RADIO_BAUD)) {
        Ok(uart) => uart,
        Err(cause) => halt("short-range UART", cause).await,
    };
    let (tx, rx) = buffers(&IMU_TX, &IMU_RX);
    let imu = match BufferedUart::new(p.USART3, p.PB9, p.PB8, tx, rx, Irqs, uart_config(IMU_BAUD)) {
        Ok(uart) => uart,
        Err(cause) => halt("yaw sensor UART", cause).await,
    };
    let (tx, rx) = buffers(&MOTOR_TX, &MOTOR_RX);
    let motor = match BufferedUart::new(p.USART4, p.PA1, p.PA0, tx, rx, Irqs, uart_config(MOTOR_BAUD)) {
        Ok(uart) => uart,
        Err(cause) => halt("motor UART", cause).await,
    };
    let ranging = match Uart::new_blocking(p.USART5, p.PB1, p.PB0, uart_config(RANGING_BAUD)) {
        Ok(uart) => uart,
        Err(cause) => halt("ranging UART", cause).await,
    };
    let inertial = I2c::new_blocking(p.I2C2, p.PA11, p.PA12, i2c::Config::default());

    let (lora_tx, lora_rx) = lora.split();
    let (ble_tx, ble_rx) = ble.split();
    let (imu_tx, imu_rx) = imu.split();
    let (motor_tx, motor_rx) = motor.split();
    // The long-range module is receive-only.
    drop(lora_tx);

    let outputs = Outputs {
        main_power: Output::new(p.PA4, Level::Low, Speed::Low),
        sensor_select: [
            Output::new(p.PA5, Level::Low, Speed::Low),
            Output::new(p.PA6, Level::Low, Speed::Low),
        ],
    };
    let peripherals = Peripherals {
        motor: motor_tx,
        link: ble_tx,
        imu: imu_tx,
        ranging,
        inertial,
    };
    let store = FlashCalibrationStore::new(Flash::new_blocking(p.FLASH));

    let config = ControllerConfig::new();
    let board = Board::new(peripherals, outputs, store, &HANDOFF, config.motor_axis);
    let controller = Controller::new(config, FirmwareInstant::now());

    let push = ExtiInput::new(p.PA7, p.EXTI7, Pull::Up);
    let pull = ExtiInput::new(p.PA8, p.EXTI8, Pull::Up);
    let edge = ExtiInput::new(p.PB6, p.EXTI6, Pull::Down);

    let spawned = [
        spawner.spawn(radio_task::run(RadioChannel::LongRange, lora_rx, &HANDOFF)),
        spawner.spawn(radio_task::run(RadioChannel::ShortRange, ble_rx, &HANDOFF)),
        spawner.spawn(sensor_task::yaw(imu_rx, &HANDOFF)),
        spawner.spawn(sensor_task::bus_current(motor_rx, config.motor_axis, &HANDOFF)),
        spawner.spawn(trigger_task::run(push, pull, edge, &HANDOFF)),
        spawner.spawn(control_task::run(controller, board, &HANDOFF)),
    ];
    for result in spawned {
        if let Err(cause) = result {
            error!("init: task spawn failed: {}", Debug2Format(&cause));
        }
    }

    info!("actuator controller running");
    core::future::pending::<()>().await;
}
