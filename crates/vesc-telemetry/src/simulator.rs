use can_transport::{CanFrame, CanId, FrameSource, Result, TransportError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};
use vesc_protocol::{encode, StatusKind};

const DEFAULT_RATE_HZ: f64 = 50.0;
/// Full-scale motor current at max RPM, amps.
const FULL_LOAD_CURRENT: f64 = 50.0;
/// Battery draw exceeds motor current by drive-train losses.
const BATTERY_CURRENT_RATIO: f64 = 1.15;
const AMBIENT_C: f64 = 25.0;
const RPM_INERTIA: f64 = 5.0;
/// Pack sag per amp of battery current, volts.
const SAG_V_PER_A: f64 = 0.1;

/// Throttle/brake input driving the simulated vehicle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleProfile {
    /// Fixed throttle, brake released.
    Constant { value: f64 },
    /// Accelerate, cruise, coast, brake; repeats every `period_s` seconds.
    DriveCycle { period_s: f64 },
}

impl Default for ThrottleProfile {
    fn default() -> Self {
        ThrottleProfile::Constant { value: 0.0 }
    }
}

impl ThrottleProfile {
    /// (throttle, brake) at simulated time `t`, both 0.0..=1.0.
    pub fn sample(&self, t: f64) -> (f64, f64) {
        match *self {
            ThrottleProfile::Constant { value } => (value.clamp(0.0, 1.0), 0.0),
            ThrottleProfile::DriveCycle { period_s } => {
                let period = period_s.max(1.0);
                let phase = (t % period) / period;
                if phase < 0.3 {
                    (phase / 0.3, 0.0)
                } else if phase < 0.6 {
                    (0.7, 0.0)
                } else if phase < 0.8 {
                    (0.7 * (1.0 - (phase - 0.6) / 0.2), 0.0)
                } else {
                    (0.0, (phase - 0.8) / 0.2)
                }
            }
        }
    }
}

/// Parameters of the simulated kart. Defaults model the real vehicle: 48 V
/// pack, 130 KV outrunner, 7 pole pairs, VESC broadcasting at 50 Hz.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub rate_hz: f64,
    pub seed: u64,
    pub nominal_voltage: f64,
    pub motor_kv: f64,
    pub pole_pairs: u32,
    pub throttle: ThrottleProfile,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_RATE_HZ,
            seed: 7,
            nominal_voltage: 48.0,
            motor_kv: 130.0,
            pole_pairs: 7,
            throttle: ThrottleProfile::default(),
        }
    }
}

/// Frame source that fabricates the five-frame status broadcast from a
/// small vehicle model, for development and tests without hardware.
///
/// The model integrates with a fixed step of `1 / rate_hz`, and all noise
/// comes from a seeded RNG, so the payload sequence is a pure function of
/// the config. Only frame pacing depends on the wall clock.
pub struct VirtualSource {
    config: SimulatorConfig,
    rng: StdRng,
    sim_time: f64,
    rpm: f64,
    voltage: f64,
    temp_mosfet: f64,
    amp_hours: f64,
    watt_hours: f64,
    tach_counts: f64,
    queue: VecDeque<CanFrame>,
    next_tick: Instant,
    closed: bool,
}

impl VirtualSource {
    pub fn new(mut config: SimulatorConfig) -> Self {
        if !(config.rate_hz.is_finite() && config.rate_hz > 0.0) {
            config.rate_hz = DEFAULT_RATE_HZ;
        }
        let rng = StdRng::seed_from_u64(config.seed);
        let voltage = config.nominal_voltage;
        Self {
            config,
            rng,
            sim_time: 0.0,
            rpm: 0.0,
            voltage,
            temp_mosfet: AMBIENT_C,
            amp_hours: 0.0,
            watt_hours: 0.0,
            tach_counts: 0.0,
            queue: VecDeque::with_capacity(StatusKind::COUNT),
            next_tick: Instant::now(),
            closed: false,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.rate_hz)
    }

    /// Advance the model one fixed step and queue one broadcast round.
    fn step(&mut self) {
        let dt = 1.0 / self.config.rate_hz;
        self.sim_time += dt;
        let (throttle, brake) = self.config.throttle.sample(self.sim_time);

        let max_rpm = self.config.nominal_voltage * self.config.motor_kv;
        let target_rpm = max_rpm * throttle * (1.0 - brake);
        self.rpm += (target_rpm - self.rpm) * dt * RPM_INERTIA;
        self.rpm = self.rpm.clamp(0.0, max_rpm);

        let (motor_current, battery_current) = if self.rpm > 0.0 {
            let jitter = 1.0 + self.rng.gen_range(-0.1..=0.1);
            let motor = self.rpm / max_rpm * FULL_LOAD_CURRENT * jitter;
            (motor, motor * BATTERY_CURRENT_RATIO)
        } else {
            (0.0, 0.0)
        };

        let target_temp = AMBIENT_C + battery_current.abs() * 2.0;
        self.temp_mosfet += (target_temp - self.temp_mosfet) * dt * 0.5;

        self.voltage = self.config.nominal_voltage - battery_current * SAG_V_PER_A
            + self.rng.gen_range(-0.2..=0.2);

        let duty = throttle * (1.0 - brake);
        self.amp_hours += battery_current * dt / 3600.0;
        self.watt_hours += battery_current * self.voltage * dt / 3600.0;
        self.tach_counts += self.rpm * f64::from(self.config.pole_pairs) / 60.0 * dt;

        let at = Instant::now();
        self.push_frame(
            StatusKind::ThermalCurrentDuty,
            encode::thermal_current_duty(
                (self.temp_mosfet * 10.0).round() as i16,
                (motor_current * 10.0).round() as i16,
                (duty * 1000.0).round() as u8,
            ),
            at,
        );
        self.push_frame(
            StatusKind::RpmVoltage,
            encode::rpm_voltage(self.rpm.round() as i32, (self.voltage * 10.0).round() as u16),
            at,
        );
        self.push_frame(
            StatusKind::AmpHours,
            encode::amp_hours((self.amp_hours * 10_000.0).round() as i32, 0),
            at,
        );
        self.push_frame(
            StatusKind::WattHours,
            encode::watt_hours((self.watt_hours * 10_000.0).round() as i32, 0),
            at,
        );
        self.push_frame(
            StatusKind::Tachometer,
            encode::tachometer(
                self.tach_counts.round() as i32,
                self.tach_counts.abs().round() as i32,
            ),
            at,
        );
    }

    fn push_frame(&mut self, kind: StatusKind, payload: [u8; 8], at: Instant) {
        // Both constructors are infallible for the five known ids.
        if let Some(id) = CanId::from_raw(kind.frame_id()) {
            if let Some(frame) = CanFrame::with_timestamp(id, &payload, at) {
                self.queue.push_back(frame);
            }
        }
    }
}

impl FrameSource for VirtualSource {
    fn recv(&mut self, timeout: Duration) -> Result<CanFrame> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Some(frame) = self.queue.pop_front() {
            return Ok(frame);
        }
        let now = Instant::now();
        if self.next_tick > now {
            let wait = self.next_tick - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Err(TransportError::Timeout);
            }
            thread::sleep(wait);
        }
        self.next_tick += self.period();
        self.step();
        self.queue
            .pop_front()
            .ok_or(TransportError::InvalidFrame("tick produced no frames"))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.queue.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::float_cmp)]
mod tests {
    use super::*;
    use vesc_protocol::{decode_frame, StatusFragment};

    fn fast_config(throttle: f64) -> SimulatorConfig {
        SimulatorConfig {
            rate_hz: 1000.0,
            throttle: ThrottleProfile::Constant { value: throttle },
            ..SimulatorConfig::default()
        }
    }

    fn pull(source: &mut VirtualSource, count: usize) -> Vec<CanFrame> {
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            match source.recv(Duration::from_millis(100)) {
                Ok(frame) => frames.push(frame),
                Err(TransportError::Timeout) => {}
                Err(err) => panic!("unexpected source error: {err}"),
            }
        }
        frames
    }

    #[test]
    fn broadcast_cycles_through_all_five_kinds() {
        let mut source = VirtualSource::new(fast_config(0.5));
        let frames = pull(&mut source, 10);
        let ids: Vec<u32> = frames.iter().map(|f| f.id.raw()).collect();
        assert_eq!(ids, vec![2, 3, 4, 5, 6, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn every_generated_frame_decodes() {
        let mut source = VirtualSource::new(SimulatorConfig {
            throttle: ThrottleProfile::DriveCycle { period_s: 2.0 },
            ..fast_config(0.0)
        });
        for frame in pull(&mut source, 100) {
            decode_frame(&frame).unwrap();
        }
    }

    #[test]
    fn same_config_same_payloads() {
        let config = SimulatorConfig {
            seed: 0xDECAF,
            throttle: ThrottleProfile::DriveCycle { period_s: 3.0 },
            ..fast_config(0.0)
        };
        let mut a = VirtualSource::new(config.clone());
        let mut b = VirtualSource::new(config);
        let frames_a = pull(&mut a, 60);
        let frames_b = pull(&mut b, 60);
        for (fa, fb) in frames_a.iter().zip(&frames_b) {
            assert_eq!(fa.id, fb.id);
            assert_eq!(fa.payload(), fb.payload());
        }
    }

    #[test]
    fn different_seed_diverges() {
        let base = SimulatorConfig {
            throttle: ThrottleProfile::Constant { value: 0.8 },
            ..fast_config(0.8)
        };
        let mut a = VirtualSource::new(SimulatorConfig { seed: 1, ..base.clone() });
        let mut b = VirtualSource::new(SimulatorConfig { seed: 2, ..base });
        // Let the models spin up, then compare a voltage frame.
        let frames_a = pull(&mut a, 200);
        let frames_b = pull(&mut b, 200);
        assert!(frames_a
            .iter()
            .zip(&frames_b)
            .any(|(fa, fb)| fa.payload() != fb.payload()));
    }

    #[test]
    fn idle_vehicle_reports_zeros() {
        let mut source = VirtualSource::new(fast_config(0.0));
        for frame in pull(&mut source, 20) {
            match decode_frame(&frame).unwrap() {
                StatusFragment::ThermalCurrentDuty {
                    motor_current, duty, ..
                } => {
                    assert_eq!(motor_current, 0.0);
                    assert_eq!(duty, 0.0);
                }
                StatusFragment::RpmVoltage { rpm, voltage, .. } => {
                    assert_eq!(rpm, 0);
                    assert!(voltage > 40.0, "pack voltage missing: {voltage}");
                }
                StatusFragment::AmpHours { consumed, .. } => assert_eq!(consumed, 0.0),
                StatusFragment::WattHours { consumed, .. } => assert_eq!(consumed, 0.0),
                StatusFragment::Tachometer { relative, .. } => assert_eq!(relative, 0),
            }
        }
    }

    #[test]
    fn throttle_spins_the_motor_up() {
        let mut source = VirtualSource::new(fast_config(0.8));
        let frames = pull(&mut source, 500);
        let last_rpm = frames
            .iter()
            .rev()
            .find_map(|frame| match decode_frame(frame) {
                Ok(StatusFragment::RpmVoltage { rpm, .. }) => Some(rpm),
                _ => None,
            })
            .unwrap();
        assert!(last_rpm > 1000, "rpm stuck at {last_rpm}");
    }

    #[test]
    fn short_timeout_reports_timeout() {
        // 1 Hz cadence: an early 5 ms recv cannot have a frame ready after
        // the first broadcast round is drained.
        let mut source = VirtualSource::new(SimulatorConfig {
            rate_hz: 1.0,
            ..SimulatorConfig::default()
        });
        let _first_round = pull(&mut source, 5);
        match source.recv(Duration::from_millis(5)) {
            Err(TransportError::Timeout) => {}
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn closed_source_stops_producing() {
        let mut source = VirtualSource::new(fast_config(0.5));
        source.close().unwrap();
        match source.recv(Duration::from_millis(5)) {
            Err(TransportError::Closed) => {}
            other => panic!("expected closed, got {other:?}"),
        }
    }

    #[test]
    fn drive_cycle_brakes_at_end_of_period() {
        let profile = ThrottleProfile::DriveCycle { period_s: 10.0 };
        let (throttle, brake) = profile.sample(1.5);
        assert!(throttle > 0.0 && brake == 0.0);
        let (throttle, brake) = profile.sample(4.0);
        assert_eq!((throttle, brake), (0.7, 0.0));
        let (throttle, brake) = profile.sample(9.5);
        assert_eq!(throttle, 0.0);
        assert!(brake > 0.0);
    }
}
