/*!
# PTZ Bridge

Runtime pieces of the control panel to camera bridge. The `ptzbridge`
binary wires them together; other front ends (an HTTP API, a tracker) can
drive the same [`state::Orchestrator`].

## Modules

- [`camera`] - VISCA-over-IP link to one camera
- [`retry`] - bounded retry combinator used by the link
- [`input`] - panel record decoding and mode state machine
- [`leds`] - LED grid and serial flush
- [`animation`] - LED fades
- [`state`] - roster, active camera, motion and LED rendering
- [`control`] - main polling loop
- [`hardware`] - serial device and background threads
- [`dispatch`] - rate-limited command queue
- [`config`] - TOML configuration
*/

pub mod animation;
pub mod camera;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod hardware;
pub mod input;
pub mod leds;
pub mod retry;
pub mod state;

#[cfg(test)]
mod testing;
