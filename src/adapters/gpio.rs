//! LED outputs.
//!
//! Implements [`IndicatorPort`] on the two GPIOs configured by
//! [`hw_init`](crate::drivers::hw_init).  Stateless, so one instance is
//! shared by every task.

use crate::app::ports::{IndicatorPort, Led};
use crate::drivers::hw_init::gpio_write;
use crate::pins;

#[derive(Debug, Clone, Copy, Default)]
pub struct GpioIndicators;

impl GpioIndicators {
    pub const fn pin(led: Led) -> i32 {
        match led {
            Led::Activity => pins::ACTIVITY_LED_GPIO,
            Led::Link => pins::LINK_LED_GPIO,
        }
    }
}

impl IndicatorPort for GpioIndicators {
    fn set(&self, led: Led, on: bool) {
        gpio_write(Self::pin(led), on);
    }
}
