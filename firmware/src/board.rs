//! Board adapters implementing the control core's collaborator traits on the
//! STM32G0 peripherals.
//!
//! Writes to the serial peripherals are blocking and short; the reader halves
//! of the buffered UARTs live in their own tasks and hand results over through
//! [`Handoff`].

use actuator_core::command::RawFrame;
use actuator_core::hal::{
    CalibrationState, CalibrationStore, Calibrator, FrameSource, InertialSensor, LinkControl,
    LowPowerSignal, MotorDriver, OriginBusy, PowerRails, RadioChannel, RangingDevice,
    StorageError, TriggerFlags, TriggerSource, YawSource,
};
use defmt::{Debug2Format, warn};
use embassy_stm32::gpio::Output;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Blocking;
use embassy_stm32::usart::{self, BufferedUartTx, Uart};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

use crate::calibration::{FlashCalibrationStore, capture_open_position};
use crate::handoff::Handoff;
use crate::link::{RANGING_SAVE, at_line, ranging_threshold};
use crate::{imu, motor};

/// Inertial sensor I2C address and its power-management register.
const INERTIAL_ADDRESS: u8 = 0x68;
const INERTIAL_PWR_MGMT: u8 = 0x6B;
const INERTIAL_SLEEP: u8 = 0x40;

pub type SharedHandoff = Handoff<ThreadModeRawMutex>;

/// Output pins driven by the control loop.
pub struct Outputs {
    pub main_power: Output<'static>,
    pub sensor_select: [Output<'static>; 2],
}

/// Transmit halves and blocking peripherals owned by the control task.
pub struct Peripherals {
    pub motor: BufferedUartTx<'static>,
    pub link: BufferedUartTx<'static>,
    pub imu: BufferedUartTx<'static>,
    pub ranging: Uart<'static, Blocking>,
    pub inertial: I2c<'static, Blocking>,
}

pub struct Board {
    peripherals: Peripherals,
    outputs: Outputs,
    store: FlashCalibrationStore,
    handoff: &'static SharedHandoff,
    motor_axis: u8,
}

impl Board {
    pub fn new(
        peripherals: Peripherals,
        outputs: Outputs,
        store: FlashCalibrationStore,
        handoff: &'static SharedHandoff,
        motor_axis: u8,
    ) -> Self {
        Self {
            peripherals,
            outputs,
            store,
            handoff,
            motor_axis,
        }
    }
}

fn write_all(tx: &mut BufferedUartTx<'static>, mut bytes: &[u8]) -> Result<(), usart::Error> {
    while !bytes.is_empty() {
        let written = tx.blocking_write(bytes)?;
        bytes = &bytes[written..];
    }
    tx.blocking_flush()
}

fn update_ranging(uart: &mut Uart<'static, Blocking>, threshold: &[u8]) -> Result<(), usart::Error> {
    uart.blocking_write(threshold)?;
    uart.blocking_write(RANGING_SAVE.as_bytes())?;
    uart.blocking_flush()
}

fn send_motor(board: &mut Board, frame: &[u8]) {
    if let Err(error) = write_all(&mut board.peripherals.motor, frame) {
        warn!("board: motor write failed: {}", Debug2Format(&error));
    }
}

impl YawSource for Board {
    fn current_angle(&mut self) -> f32 {
        self.handoff.yaw.latest()
    }

    fn reset_origin(&mut self) -> Result<(), OriginBusy> {
        write_all(&mut self.peripherals.imu, &imu::RESET_YAW).map_err(|_| OriginBusy)
    }

    fn enter_low_power(&mut self) {
        if let Err(error) = write_all(&mut self.peripherals.imu, &imu::SLEEP) {
            warn!("board: yaw sensor sleep failed: {}", Debug2Format(&error));
        }
    }
}

impl MotorDriver for Board {
    fn drive(&mut self, axis: u8, speed: i16, accel: u8) {
        send_motor(self, &motor::drive(axis, speed, accel));
    }

    fn stop(&mut self) {
        let frame = motor::stop(self.motor_axis);
        send_motor(self, &frame);
    }

    fn prime_speed_loop(&mut self) {
        let frame = motor::enable(self.motor_axis);
        send_motor(self, &frame);
    }

    fn set_bus_current_slot(&mut self, slot: u8) {
        let frame = motor::query_bus_current(self.motor_axis, slot);
        send_motor(self, &frame);
    }

    fn read_bus_current(&mut self) -> Option<f32> {
        self.handoff.bus_current.take()
    }
}

impl FrameSource for Board {
    fn poll_new_frame(&mut self, channel: RadioChannel) -> Option<RawFrame> {
        self.handoff.take_frame(channel)
    }
}

impl LinkControl for Board {
    fn send_at_command(&mut self, command: &str) {
        let Ok(line) = at_line(command) else {
            warn!("board: AT command too long: {}", command);
            return;
        };
        if let Err(error) = write_all(&mut self.peripherals.link, line.as_bytes()) {
            warn!("board: link write failed: {}", Debug2Format(&error));
        }
    }
}

impl PowerRails for Board {
    fn set_main_power(&mut self, on: bool) {
        if on {
            self.outputs.main_power.set_high();
        } else {
            self.outputs.main_power.set_low();
        }
    }

    fn set_sensor_select(&mut self, asserted: bool) {
        for pin in &mut self.outputs.sensor_select {
            if asserted {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
    }
}

impl InertialSensor for Board {
    fn enter_sleep(&mut self) {
        if let Err(error) = self
            .peripherals
            .inertial
            .blocking_write(INERTIAL_ADDRESS, &[INERTIAL_PWR_MGMT, INERTIAL_SLEEP])
        {
            warn!("board: inertial sleep failed: {}", Debug2Format(&error));
        }
    }
}

impl RangingDevice for Board {
    fn set_distance_threshold_and_persist(&mut self, threshold: u16) {
        let Ok(line) = ranging_threshold(threshold) else {
            return;
        };
        if let Err(error) = update_ranging(&mut self.peripherals.ranging, line.as_bytes()) {
            warn!("board: ranging update failed: {}", Debug2Format(&error));
        }
    }
}

impl LowPowerSignal for Board {
    fn request_low_power(&mut self) {
        self.handoff.request_low_power();
    }
}

impl TriggerSource for Board {
    fn take_triggers(&mut self) -> TriggerFlags {
        self.handoff.triggers.take()
    }

    fn take_edge(&mut self) -> bool {
        self.handoff.triggers.take_edge()
    }
}

impl CalibrationStore for Board {
    fn load(&mut self) -> Option<CalibrationState> {
        self.store.load()
    }

    fn save(&mut self, state: CalibrationState) -> Result<(), StorageError> {
        self.store.save(state)
    }
}

impl Calibrator for Board {
    fn calibrate(&mut self, current: CalibrationState) -> CalibrationState {
        capture_open_position(self.handoff.yaw.latest(), current)
    }
}
