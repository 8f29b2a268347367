//! GPIO / peripheral pin assignments for the NetKey board.
//!
//! Single source of truth; every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Indicator LEDs (active HIGH)
// ---------------------------------------------------------------------------

/// Activity LED: command processing, provisioning in progress, confirmation prompt.
pub const ACTIVITY_LED_GPIO: i32 = 25;
/// Link LED: blinks while searching for a network, steady once connected.
pub const LINK_LED_GPIO: i32 = 26;

// ---------------------------------------------------------------------------
// Physical inputs (rising edge, internal pull-down)
// ---------------------------------------------------------------------------

/// Confirm button: operator approval of a security operation.
pub const CONFIRM_BUTTON_GPIO: i32 = 12;
/// Hard-reset button: erase provisioning state and restart.
pub const RESET_BUTTON_GPIO: i32 = 17;
