//! GPIO relay wired across the wall console's push button

use async_trait::async_trait;
use rppal::gpio::{Gpio, OutputPin};
use std::fmt::Display;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A digital output pin
pub trait RelayPin: Send {
    fn set_high(&mut self) -> io::Result<()>;

    fn set_low(&mut self) -> io::Result<()>;

    fn is_simulated(&self) -> bool {
        false
    }
}

/// A BCM-numbered Raspberry Pi output
#[derive(Debug)]
pub struct GpioPin {
    pin: OutputPin,
}

impl GpioPin {
    /// Claim `pin` as an output, starting low
    pub fn open(pin: u8) -> Result<Self, rppal::gpio::Error> {
        let pin = Gpio::new()?.get(pin)?.into_output_low();
        Ok(Self { pin })
    }
}

impl RelayPin for GpioPin {
    fn set_high(&mut self) -> io::Result<()> {
        self.pin.set_high();
        Ok(())
    }

    fn set_low(&mut self) -> io::Result<()> {
        self.pin.set_low();
        Ok(())
    }
}

/// Stand-in used when no GPIO is available; only logs
#[derive(Debug, Default)]
pub struct SimulatedPin {
    high: bool,
}

impl SimulatedPin {
    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl RelayPin for SimulatedPin {
    fn set_high(&mut self) -> io::Result<()> {
        info!("SIMULATION: relay on");
        self.high = true;
        Ok(())
    }

    fn set_low(&mut self) -> io::Result<()> {
        info!("SIMULATION: relay off");
        self.high = false;
        Ok(())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Open the GPIO pin, falling back to simulation when that fails
pub fn open_pin(pin: u8) -> Box<dyn RelayPin> {
    or_simulated(pin, GpioPin::open(pin))
}

fn or_simulated<P, E>(pin: u8, opened: Result<P, E>) -> Box<dyn RelayPin>
where
    P: RelayPin + 'static,
    E: Display,
{
    match opened {
        Ok(output) => {
            info!(pin, "GPIO initialized");
            Box::new(output)
        }
        Err(err) => {
            warn!(pin, %err, "GPIO unavailable, running in simulation mode");
            Box::new(SimulatedPin::default())
        }
    }
}

/// Something that can press the console button once
#[async_trait]
pub trait Pulser: Send + Sync {
    async fn pulse(&self) -> io::Result<()>;

    fn is_active(&self) -> bool;
}

/// The console relay; presses are serialized
pub struct Relay {
    pin: Mutex<Box<dyn RelayPin>>,
    hold: Duration,
    active: AtomicBool,
}

impl Relay {
    pub fn new(pin: Box<dyn RelayPin>, hold: Duration) -> Self {
        Self {
            pin: Mutex::new(pin),
            hold,
            active: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Pulser for Relay {
    /// Press, hold, release
    ///
    /// The pin is released even if the hold is interrupted by an error
    /// setting it high.
    async fn pulse(&self) -> io::Result<()> {
        let mut pin = self.pin.lock().await;
        self.active.store(true, Ordering::SeqCst);

        let pressed = pin.set_high();
        if pressed.is_ok() {
            tokio::time::sleep(self.hold).await;
        }
        let released = pin.set_low();

        self.active.store(false, Ordering::SeqCst);
        pressed.and(released)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
