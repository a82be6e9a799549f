use embassy_futures::select::{Either3, select3};
use embassy_stm32::exti::ExtiInput;
use embassy_time::{Duration, Timer};

use crate::board::SharedHandoff;
use crate::handoff::ManualTrigger;

const DEBOUNCE: Duration = Duration::from_millis(20);

/// Debounces the push/pull sensors (active low) and the manual edge input
/// (active high), latching each confirmed trigger.
#[embassy_executor::task]
pub async fn run(
    mut push: ExtiInput<'static>,
    mut pull: ExtiInput<'static>,
    mut edge: ExtiInput<'static>,
    handoff: &'static SharedHandoff,
) -> ! {
    loop {
        let trigger = match select3(
            push.wait_for_falling_edge(),
            pull.wait_for_falling_edge(),
            edge.wait_for_rising_edge(),
        )
        .await
        {
            Either3::First(()) => ManualTrigger::Forward,
            Either3::Second(()) => ManualTrigger::Reverse,
            Either3::Third(()) => ManualTrigger::Edge,
        };

        Timer::after(DEBOUNCE).await;
        let held = match trigger {
            ManualTrigger::Forward => push.is_low(),
            ManualTrigger::Reverse => pull.is_low(),
            ManualTrigger::Edge => edge.is_high(),
        };
        if held {
            handoff.raise_trigger(trigger);
        }
    }
}
