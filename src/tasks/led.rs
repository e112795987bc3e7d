//! LED 任务: 显示加热状态队列中的每个状态

use crate::hw::{HeatingIndicator, SerialPort};
use crate::registry::Registry;
use crate::tasks::HeatingState;
use crate::util::log::*;

pub async fn step<P, I>(registry: &Registry<P>, indicator: &mut I) -> HeatingState
where
    P: SerialPort + Send + 'static,
    I: HeatingIndicator,
{
    let state = registry.state_queue().receive().await;
    indicator.show(state);
    state
}

/// 任务入口
pub async fn run<P, I>(registry: &'static Registry<P>, mut indicator: I) -> !
where
    P: SerialPort + Send + 'static,
    I: HeatingIndicator,
{
    log_info!("Led task started");
    loop {
        step(registry, &mut indicator).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::full_registry;

    #[derive(Default)]
    struct Shown(std::vec::Vec<HeatingState>);

    impl HeatingIndicator for Shown {
        fn show(&mut self, state: HeatingState) {
            self.0.push(state);
        }
    }

    #[test]
    fn test_states_shown_in_order() {
        let registry = full_registry();
        let mut shown = Shown::default();
        registry.state_queue().try_send(HeatingState::High).unwrap();
        registry.state_queue().try_send(HeatingState::Fault).unwrap();

        embassy_futures::block_on(step(registry, &mut shown));
        embassy_futures::block_on(step(registry, &mut shown));
        assert_eq!(shown.0, vec![HeatingState::High, HeatingState::Fault]);
    }
}
