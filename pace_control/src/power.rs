//! Power monitor: battery voltage and motor currents with fault timers.
//!
//! Runs at the full 1 kHz alongside the sensing stages, so the error
//! counters are in milliseconds. A failed conversion feeds the voltage
//! average with zero and counts toward the ADC fault timer; sustained
//! under-voltage counts toward the battery fault timer. The system layer
//! resets the board when either passes its limit.

use pace_common::consts::{
    BATTERY_AVERAGE_SAMPLES, BATTERY_VOLTAGE_ADC_GAIN, BATTERY_VOLTAGE_LIMIT_MIN,
    MOTOR_CURRENT_DIV_RESISTOR, REGULATOR_VOLTAGE,
};
use pace_hal::{
    PowerSenseAdc, POWER_CHANNELS, POWER_ORDER_BATTERY, POWER_ORDER_CURRENT_LEFT,
    POWER_ORDER_CURRENT_RIGHT,
};

use crate::filter::MovingAverage;

/// Full-scale 12-bit ADC count.
const ADC_MAX: f32 = 4095.0;

/// Battery / motor-current monitor.
#[derive(Debug, Clone)]
pub struct PowerMonitor {
    battery_average: MovingAverage<BATTERY_AVERAGE_SAMPLES>,
    battery_voltage: f32,
    motor_current: [f32; 2],
    /// Consecutive ticks below the battery minimum [ms].
    battery_error_ticks: u32,
    /// Consecutive failed conversions [ms].
    adc_error_ticks: u32,
}

impl PowerMonitor {
    pub fn new() -> Self {
        Self {
            battery_average: MovingAverage::new(),
            battery_voltage: 0.0,
            motor_current: [0.0; 2],
            battery_error_ticks: 0,
            adc_error_ticks: 0,
        }
    }

    /// Clear the averages and fault timers.
    pub fn reset(&mut self) {
        self.battery_average.reset();
        self.battery_voltage = 0.0;
        self.motor_current = [0.0; 2];
        self.battery_error_ticks = 0;
        self.adc_error_ticks = 0;
    }

    /// One tick: fetch the ADC, refresh voltage, currents and timers.
    pub fn update(&mut self, adc: &mut dyn PowerSenseAdc) -> bool {
        if adc.fetch().is_err() {
            self.adc_error_ticks += 1;
            self.battery_average.update(0.0);
            self.motor_current = [0.0; 2];
            return false;
        }

        let mut volts = [0.0f32; POWER_CHANNELS];
        for (order, v) in volts.iter_mut().enumerate() {
            *v = adc.raw(order) as f32 * REGULATOR_VOLTAGE / ADC_MAX;
        }

        self.adc_error_ticks = 0;
        self.battery_voltage = volts[POWER_ORDER_BATTERY] * BATTERY_VOLTAGE_ADC_GAIN;
        self.battery_average.update(self.battery_voltage);

        if self.battery_average.get() > BATTERY_VOLTAGE_LIMIT_MIN {
            self.battery_error_ticks = 0;
        } else {
            self.battery_error_ticks += 1;
        }

        // Shunt amplifiers are referenced to mid-rail; 499 Ω/V of current.
        let right = (2.0 * volts[POWER_ORDER_CURRENT_RIGHT] - REGULATOR_VOLTAGE)
            / (MOTOR_CURRENT_DIV_RESISTOR / 10_000.0);
        let left = (2.0 * volts[POWER_ORDER_CURRENT_LEFT] - REGULATOR_VOLTAGE)
            / (MOTOR_CURRENT_DIV_RESISTOR / 10_000.0);
        self.motor_current = [right, left];
        true
    }

    /// Last instantaneous battery voltage [V].
    #[inline]
    pub fn battery_voltage(&self) -> f32 {
        self.battery_voltage
    }

    /// Moving-averaged battery voltage [V].
    #[inline]
    pub fn battery_voltage_average(&self) -> f32 {
        self.battery_average.get()
    }

    /// Motor currents `[right, left]` [A].
    #[inline]
    pub fn motor_current(&self) -> [f32; 2] {
        self.motor_current
    }

    /// Consecutive under-voltage time [ms].
    #[inline]
    pub fn battery_error_time(&self) -> u32 {
        self.battery_error_ticks
    }

    /// Consecutive ADC failure time [ms].
    #[inline]
    pub fn adc_error_time(&self) -> u32 {
        self.adc_error_ticks
    }
}

impl Default for PowerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pace_hal::sim::SimBoard;

    #[test]
    fn battery_voltage_converts_from_counts() {
        let (mut board, handle) = SimBoard::new();
        let mut power = PowerMonitor::new();
        handle.set_battery_voltage(12.0);
        assert!(power.update(&mut board.power_adc));
        assert!((power.battery_voltage() - 12.0).abs() < 0.02);
        assert!((power.battery_voltage_average() - 12.0).abs() < 0.02);
    }

    #[test]
    fn healthy_battery_keeps_timer_at_zero() {
        let (mut board, handle) = SimBoard::new();
        let mut power = PowerMonitor::new();
        handle.set_battery_voltage(12.0);
        for _ in 0..100 {
            power.update(&mut board.power_adc);
        }
        assert_eq!(power.battery_error_time(), 0);
    }

    #[test]
    fn under_voltage_accumulates() {
        let (mut board, handle) = SimBoard::new();
        let mut power = PowerMonitor::new();
        handle.set_battery_voltage(9.0);
        for _ in 0..50 {
            power.update(&mut board.power_adc);
        }
        assert_eq!(power.battery_error_time(), 50);

        // Recovery clears the timer.
        handle.set_battery_voltage(12.0);
        for _ in 0..BATTERY_AVERAGE_SAMPLES {
            power.update(&mut board.power_adc);
        }
        assert_eq!(power.battery_error_time(), 0);
    }

    #[test]
    fn failed_fetch_counts_and_recovers() {
        let (mut board, handle) = SimBoard::new();
        let mut power = PowerMonitor::new();
        handle.set_failures(false, false, true, false);
        for _ in 0..10 {
            assert!(!power.update(&mut board.power_adc));
        }
        assert_eq!(power.adc_error_time(), 10);

        handle.set_failures(false, false, false, false);
        handle.set_battery_voltage(12.0);
        assert!(power.update(&mut board.power_adc));
        assert_eq!(power.adc_error_time(), 0);
    }

    #[test]
    fn idle_motors_read_near_zero_current() {
        let (mut board, handle) = SimBoard::new();
        let mut power = PowerMonitor::new();
        // set_battery_voltage scripts mid-rail current channels.
        handle.set_battery_voltage(12.0);
        power.update(&mut board.power_adc);
        let current = power.motor_current();
        assert!(current[0].abs() < 0.01);
        assert!(current[1].abs() < 0.01);
    }
}
