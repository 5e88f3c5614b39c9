//! Binding-independent sequencing of one simulated response.

use std::collections::VecDeque;
use std::time::Duration;

use super::event::StreamEvent;
use super::frame::frame_text;
use super::params::{FanoutMode, SimulationParams};

/// One primitive action of a simulated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Wait without occupying the CPU.
    Suspend(Duration),
    /// Busy-wait on the executing thread.
    Spin(Duration),
    /// Best-effort call to the tool endpoint.
    CallTool { cpu_spin_ms: i64 },
    /// Hand an event to the client.
    Emit(StreamEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fanout,
    Frames,
    Finished,
}

/// Lazy, single-use sequence of [`Step`]s for one request.
///
/// Fan-out iterations come first, then `frames` frame iterations, then a
/// single `Done`. After [`Script::fail`] the script yields one `Error` event
/// followed by `Done` and ends, so a stream always has a terminal marker.
#[derive(Debug)]
pub struct Script {
    params: SimulationParams,
    phase: Phase,
    fanout_done: i64,
    frames_done: i64,
    frame: Option<String>,
    pending: VecDeque<Step>,
    done_emitted: bool,
}

impl Script {
    pub fn new(params: SimulationParams) -> Self {
        Self {
            params,
            phase: Phase::Fanout,
            fanout_done: 0,
            frames_done: 0,
            frame: None,
            pending: VecDeque::with_capacity(3),
            done_emitted: false,
        }
    }

    /// Abandon the remaining work and end with an error frame.
    ///
    /// Has no effect once `Done` has been yielded.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.done_emitted {
            return;
        }
        self.pending.clear();
        self.pending.push_back(Step::Emit(StreamEvent::error(message)));
        self.pending.push_back(Step::Emit(StreamEvent::Done));
        self.phase = Phase::Finished;
    }

    fn plan_fanout_call(&mut self) {
        if let Some(delay) = self.params.fanout_delay() {
            self.pending.push_back(Step::Suspend(delay));
        }
        match self.params.fanout_mode {
            FanoutMode::RemoteCall => self.pending.push_back(Step::CallTool {
                cpu_spin_ms: self.params.cpu_spin_ms,
            }),
            FanoutMode::LocalSpin => {
                if let Some(spin) = self.params.cpu_spin() {
                    self.pending.push_back(Step::Spin(spin));
                }
            }
        }
    }

    fn plan_frame(&mut self) {
        let content = match self.frame.clone() {
            Some(text) => text,
            None => match frame_text(self.params.bytes_per_frame) {
                Ok(text) => {
                    self.frame = Some(text.clone());
                    text
                }
                Err(fault) => {
                    self.fail(fault.to_string());
                    return;
                }
            },
        };

        if let Some(spin) = self.params.cpu_spin() {
            self.pending.push_back(Step::Spin(spin));
        }
        self.pending.push_back(Step::Emit(StreamEvent::Delta { content }));
        if let Some(delay) = self.params.delay() {
            self.pending.push_back(Step::Suspend(delay));
        }
    }
}

impl Iterator for Script {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        loop {
            if let Some(step) = self.pending.pop_front() {
                if matches!(step, Step::Emit(StreamEvent::Done)) {
                    self.done_emitted = true;
                }
                return Some(step);
            }

            match self.phase {
                Phase::Fanout => {
                    if self.fanout_done < self.params.fanout {
                        self.fanout_done += 1;
                        self.plan_fanout_call();
                    } else {
                        self.phase = Phase::Frames;
                    }
                }
                Phase::Frames => {
                    if self.frames_done < self.params.frames {
                        self.frames_done += 1;
                        self.plan_frame();
                    } else {
                        self.pending.push_back(Step::Emit(StreamEvent::Done));
                        self.phase = Phase::Finished;
                    }
                }
                Phase::Finished => return None,
            }
        }
    }
}
