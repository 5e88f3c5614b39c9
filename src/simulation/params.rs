//! Simulation parameters and their resolution from a request body.

use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::SimulationDefaults;
use crate::error::ConfigError;

/// How each fan-out call is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutMode {
    /// Busy-wait locally for `cpu_spin_ms`.
    LocalSpin,
    /// POST to the sibling tool endpoint, ignoring the outcome.
    RemoteCall,
}

impl FanoutMode {
    /// Label for metrics/logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            FanoutMode::LocalSpin => "local",
            FanoutMode::RemoteCall => "http",
        }
    }
}

/// Fully resolved knobs for one simulated request.
///
/// Values are not range checked: negative numbers are kept as given and every
/// consumer treats `<= 0` as "disabled".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationParams {
    pub frames: i64,
    pub delay_ms: i64,
    pub bytes_per_frame: i64,
    pub cpu_spin_ms: i64,
    pub fanout: i64,
    pub fanout_delay_ms: i64,
    pub fanout_mode: FanoutMode,
}

impl SimulationParams {
    /// Parameters taken entirely from the process-wide defaults.
    pub fn from_defaults(defaults: &SimulationDefaults) -> Self {
        Self {
            frames: defaults.frames,
            delay_ms: defaults.delay_ms,
            bytes_per_frame: defaults.bytes_per_frame,
            cpu_spin_ms: defaults.cpu_spin_ms,
            fanout: defaults.fanout,
            fanout_delay_ms: defaults.fanout_delay_ms,
            fanout_mode: if defaults.fanout_http {
                FanoutMode::RemoteCall
            } else {
                FanoutMode::LocalSpin
            },
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        positive_millis(self.delay_ms)
    }

    pub fn cpu_spin(&self) -> Option<Duration> {
        positive_millis(self.cpu_spin_ms)
    }

    pub fn fanout_delay(&self) -> Option<Duration> {
        positive_millis(self.fanout_delay_ms)
    }
}

fn positive_millis(ms: i64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms as u64))
}

/// Merge a request body with the process-wide defaults.
///
/// Each field falls back independently from the body to the defaults. The
/// fan-out mode is a deployment setting and is never read from the body.
pub fn resolve(
    body: &Map<String, Value>,
    defaults: &SimulationDefaults,
) -> Result<SimulationParams, ConfigError> {
    let field = |name: &'static str, default: i64| -> Result<i64, ConfigError> {
        match body.get(name) {
            Some(value) => coerce_int(name, value),
            None => Ok(default),
        }
    };

    let base = SimulationParams::from_defaults(defaults);
    Ok(SimulationParams {
        frames: field("frames", base.frames)?,
        delay_ms: field("delay_ms", base.delay_ms)?,
        bytes_per_frame: field("bytes_per_frame", base.bytes_per_frame)?,
        cpu_spin_ms: field("cpu_spin_ms", base.cpu_spin_ms)?,
        fanout: field("fanout", base.fanout)?,
        fanout_delay_ms: field("fanout_delay_ms", base.fanout_delay_ms)?,
        fanout_mode: base.fanout_mode,
    })
}

/// Coerce a JSON value to an integer.
///
/// Integers pass through, floats truncate toward zero, booleans become 0/1
/// and strings must hold a decimal integer literal (see
/// [`parse_int_literal`]). Everything else is rejected.
pub fn coerce_int(field: &'static str, value: &Value) -> Result<i64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidField { field, reason };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                Err(invalid(format!("{} is out of range", n)))
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => Ok(f.trunc() as i64),
                    _ => Err(invalid(format!("{} is not a finite number", n))),
                }
            }
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => parse_int_literal(s)
            .ok_or_else(|| invalid(format!("invalid literal for int: {:?}", s))),
        Value::Null => Err(invalid("expected an integer, got null".to_string())),
        Value::Array(_) => Err(invalid("expected an integer, got an array".to_string())),
        Value::Object(_) => Err(invalid("expected an integer, got an object".to_string())),
    }
}

/// Parse a decimal integer literal.
///
/// Accepts surrounding whitespace, an optional sign and single underscores
/// between digit groups (`"1_000"`), like Python's `int()` on a string.
pub fn parse_int_literal(s: &str) -> Option<i64> {
    let s = s.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };

    let well_formed = digits
        .split('_')
        .all(|group| !group.is_empty() && group.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return None;
    }

    format!("{}{}", sign, digits.replace('_', "")).parse().ok()
}
