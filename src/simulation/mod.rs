//! Request-to-response simulation engine.
//!
//! The engine is independent of how a request is scheduled: [`Script`] yields
//! the ordered [`Step`]s of one simulated response, and a binding (see
//! [`crate::binding`]) decides how each suspend, spin and tool call is
//! carried out.

mod event;
mod frame;
mod params;
mod script;
mod spin;
mod tool;

pub use event::StreamEvent;
pub use frame::{frame_text, words_per_frame, WORD};
pub use params::{coerce_int, parse_int_literal, resolve, FanoutMode, SimulationParams};
pub use script::{Script, Step};
pub use spin::{busy_wait, busy_wait_ms};
pub use tool::{call_best_effort, HttpToolCaller, ToolCaller};
