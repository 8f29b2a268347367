//! Board-level drivers: GPIO bring-up, button ISRs, task spawning.

pub mod button;
pub mod hw_init;
pub mod task_pin;
