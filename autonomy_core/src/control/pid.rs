// autonomy_core/src/control/pid.rs

use std::time::Instant;

use crate::config::AxisGains;

/// Scalar PID regulator tracking one error channel across ticks.
///
/// Elapsed time between calls is measured from the timestamps passed in,
/// so the same regulator runs on wall-clock or simulated time.
#[derive(Debug, Clone)]
pub struct Pid {
    gains: AxisGains,
    /// Time and error of the previous call, `None` right after a reset.
    last: Option<(Instant, f64)>,
    error_integral: f64,
}

impl Pid {
    pub fn new(gains: AxisGains) -> Self {
        Self {
            gains,
            last: None,
            error_integral: 0.0,
        }
    }

    /// Replaces the gains. Accumulated state is kept.
    pub fn configure(&mut self, gains: AxisGains) {
        self.gains = gains;
    }

    pub fn gains(&self) -> AxisGains {
        self.gains
    }

    /// Clears the integral and the derivative memory.
    pub fn reset(&mut self) {
        self.last = None;
        self.error_integral = 0.0;
    }

    pub fn integral(&self) -> f64 {
        self.error_integral
    }

    /// Command for `error` using the wall clock.
    pub fn command(&mut self, error: f64) -> f64 {
        self.command_at(error, Instant::now())
    }

    /// Command for `error` observed at `now`.
    ///
    /// The first call after a reset contributes neither integral nor
    /// derivative, so a long pause never turns into a huge synthetic `dt`.
    /// A call with no elapsed time since the previous one leaves the
    /// integral and derivative memory untouched.
    pub fn command_at(&mut self, error: f64, now: Instant) -> f64 {
        let AxisGains { kp, ki, kd } = self.gains;

        let derivative = match self.last {
            None => {
                self.last = Some((now, error));
                0.0
            }
            Some((last_time, last_error)) => {
                let dt = now.saturating_duration_since(last_time).as_secs_f64();
                if dt > 0.0 {
                    self.error_integral += error * dt;
                    self.last = Some((now, error));
                    (error - last_error) / dt
                } else {
                    0.0
                }
            }
        };

        kp * error + ki * self.error_integral + kd * derivative
    }
}
