use std::io;
use std::path::PathBuf;

#[allow(dead_code)]
#[path = "../plant.rs"]
mod plant;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use actuator_core::hal::CalibrationState;
use session::{Session, SessionOptions};

const TRANSCRIPT_DIR: &str = "transcripts";

fn main() -> io::Result<()> {
    record("emulator-open.log", Some(60.0), record_open)?;
    record("emulator-obstacle.log", Some(60.0), record_obstacle)?;
    record("emulator-close-and-sleep.log", Some(60.0), record_close)?;
    record("emulator-calibration.log", None, record_calibration)?;
    Ok(())
}

fn record(
    name: &str,
    target: Option<f32>,
    script: fn(&mut Session) -> io::Result<()>,
) -> io::Result<()> {
    let mut session = Session::new(SessionOptions {
        stored: target.map(|target| CalibrationState::new(target, true)),
        transcript: Some(PathBuf::from(TRANSCRIPT_DIR).join(name)),
    })?;
    session.boot()?;
    script(&mut session)
}

fn record_open(session: &mut Session) -> io::Result<()> {
    session.handle_command("lora AA22")?;
    session.handle_command("run 3s")?;
    session.handle_command("ble AA33")?;
    session.handle_command("run 3s")?;
    session.handle_command("status")?;
    Ok(())
}

fn record_obstacle(session: &mut Session) -> io::Result<()> {
    session.handle_command("obstacle 25")?;
    session.handle_command("lora AA23")?;
    session.handle_command("run 4s")?;
    session.handle_command("status")?;
    Ok(())
}

fn record_close(session: &mut Session) -> io::Result<()> {
    session.handle_command("yaw 40")?;
    session.handle_command("lora AAOF")?;
    session.handle_command("run 10s")?;
    session.handle_command("run 20s")?;
    session.handle_command("status")?;
    session.handle_command("push")?;
    session.handle_command("run 1s")?;
    Ok(())
}

fn record_calibration(session: &mut Session) -> io::Result<()> {
    session.handle_command("yaw 75")?;
    session.handle_command("ble AA00")?;
    session.handle_command("run 50ms")?;
    session.handle_command("events")?;
    Ok(())
}
