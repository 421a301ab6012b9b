//! Gate relay and the status light.

use esp_hal::gpio::Output;

use gate_core::hal::{Color, Indicator, Relay};

/// Solid-state relay driving the gate. High = energized.
pub struct RelayOutput {
    pin: Output<'static>,
}

impl RelayOutput {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }
}

impl Relay for RelayOutput {
    fn set_relay(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

/// Common-anode RGB LED: a channel is lit when its pin is low.
pub struct RgbLed {
    red: Output<'static>,
    green: Output<'static>,
    blue: Output<'static>,
}

impl RgbLed {
    pub fn new(red: Output<'static>, green: Output<'static>, blue: Output<'static>) -> Self {
        Self { red, green, blue }
    }

    fn channel(pin: &mut Output<'static>, lit: bool) {
        if lit {
            pin.set_low();
        } else {
            pin.set_high();
        }
    }
}

impl Indicator for RgbLed {
    fn set_indicator(&mut self, color: Color) {
        let (r, g) = match color {
            Color::Off => (false, false),
            Color::Idle => (true, false),
            Color::Active => (false, true),
        };
        Self::channel(&mut self.red, r);
        Self::channel(&mut self.green, g);
        Self::channel(&mut self.blue, false);
    }
}
