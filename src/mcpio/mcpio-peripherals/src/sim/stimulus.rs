use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use log::{debug, warn};

use super::expander::SimExpander;

/// Something that happens to the expander's pins from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stimulus {
    Set { pin: u8, level: bool },
    Pulse { pin: u8, level: bool, hold: Duration }, // Drive `level`, wait, drive back
    Wait(Duration),
    Stop,
}

/// Thread that applies queued `Stimulus` events to a `SimExpander`
pub struct StimulusDriver {
    tx: Sender<Stimulus>,
    handle: Option<JoinHandle<u32>>,
}

// Applies events until `Stop` or until every sender is gone
fn stimulus_thread(rx: Receiver<Stimulus>, chip: SimExpander) -> u32 {
    let mut applied = 0;
    loop {
        let event = match rx.recv() {
            Ok(x) => x,
            _ => break,
        };

        match event {
            Stimulus::Set { pin, level } => chip.drive(pin, level),
            Stimulus::Pulse { pin, level, hold } => {
                chip.drive(pin, level);
                std::thread::sleep(hold);
                chip.drive(pin, !level);
            }
            Stimulus::Wait(period) => std::thread::sleep(period),
            Stimulus::Stop => break,
        }
        applied += 1;
    }
    debug!("stimulus thread done after {} events", applied);
    applied
}

impl StimulusDriver {
    pub fn spawn(chip: SimExpander) -> Self {
        let (tx, rx) = unbounded();

        // Spawn thread that plays events against the chip
        let handle = std::thread::spawn(move || stimulus_thread(rx, chip));
        StimulusDriver {
            tx,
            handle: Some(handle),
        }
    }

    pub fn send(&self, event: Stimulus) -> Result<(), SendError<Stimulus>> {
        self.tx.send(event)
    }

    /// Stops the thread once queued events are played, returning how many
    /// were applied
    pub fn finish(mut self) -> u32 {
        self.join()
    }

    fn join(&mut self) -> u32 {
        let _ = self.tx.send(Stimulus::Stop);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(applied)) => applied,
            Some(Err(_)) => {
                warn!("stimulus thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for StimulusDriver {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod stimulus_tests {
    use super::*;

    #[test]
    fn events_play_in_order() {
        let chip = SimExpander::default();
        let driver = StimulusDriver::spawn(chip.clone());
        driver.send(Stimulus::Set { pin: 3, level: false }).unwrap();
        driver
            .send(Stimulus::Pulse {
                pin: 9,
                level: false,
                hold: Duration::from_millis(1),
            })
            .unwrap();
        assert_eq!(driver.finish(), 2);

        assert!(!chip.level(3));
        assert!(chip.level(9));
    }
}
