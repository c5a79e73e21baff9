use chrono::{Local, TimeZone};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Digital pin access for the bit-banged sensor protocol.
///
/// Output pins ignore `read_level`; input pins ignore the setters. Keeping a
/// single trait mirrors how the pins are wired on the board: every line has
/// a level, we just only drive some of them.
pub trait PinIo {
    fn set_high(&mut self);
    fn set_low(&mut self);
    fn read_level(&self) -> bool;
}

/// Monotonic + wall-clock time source.
pub trait Clock {
    /// Milliseconds from an arbitrary but fixed origin. Used for protocol
    /// gating, never shown to a human.
    fn monotonic_ms(&self) -> u64;

    /// Seconds since the Unix epoch. Used as the ordering key for readings.
    fn epoch_secs(&self) -> i64;
}

/// Two-line character display (16x2 LCD on the reference hardware).
pub trait Display {
    fn clear(&mut self);
    fn put_str(&mut self, text: &str);
}

/// Probe for available heap, driving memory-pressure eviction in the store.
pub trait MemoryGauge {
    fn free_bytes(&self) -> usize;
}

/// Busy-wait with microsecond resolution for protocol setup/hold times.
pub fn sleep_us(us: u64) {
    std::thread::sleep(Duration::from_micros(us));
}

/// Render an epoch timestamp the way the console and display show it.
pub fn format_timestamp(epoch_secs: i64) -> String {
    match Local.timestamp_opt(epoch_secs, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S %:z").to_string(),
        None => format!("epoch {}", epoch_secs),
    }
}

// --- Production implementations ------------------------------------------

#[derive(Clone, Copy)]
pub struct SystemClock {
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn epoch_secs(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Console stand-in for the LCD.
pub struct ConsoleDisplay;

impl Display for ConsoleDisplay {
    fn clear(&mut self) {}

    fn put_str(&mut self, text: &str) {
        for line in text.lines() {
            println!("[display] {}", line);
        }
    }
}

// --- Simulated hardware ----------------------------------------------------

/// Behavioral model of the thermocouple converter seen from its three pins.
///
/// Chip-select going low loads a 16-bit frame (dummy sign bit, 12 data bits,
/// fault bit, device id bits) into a shift register; each clock cycle
/// advances it. The driver under test talks to this exactly as it would to
/// the real part.
pub struct ThermocoupleModel {
    code: u16,
    fault: bool,
    frame: u16,
    bit_index: i8,
    cs_level: bool,
    sck_level: bool,
    /// Completed shift-out cycles, for asserting protocol traffic in tests.
    pub frames_read: u32,
}

impl ThermocoupleModel {
    pub fn new() -> Self {
        ThermocoupleModel {
            code: 0,
            fault: false,
            frame: 0,
            bit_index: 15,
            cs_level: true,
            sck_level: false,
            frames_read: 0,
        }
    }

    /// Set the 12-bit conversion result the next frame will carry.
    pub fn set_code(&mut self, code: u16) {
        self.code = code & 0x0fff;
    }

    pub fn set_fault(&mut self, fault: bool) {
        self.fault = fault;
    }

    fn load_frame(&mut self) {
        // Bit 15 dummy, bits 14..3 data, bit 2 open-thermocouple fault,
        // bit 1 device id (0), bit 0 tri-state.
        self.frame = (self.code << 3) | ((self.fault as u16) << 2) | 0x0001;
        self.bit_index = 15;
    }

    fn so_level(&self) -> bool {
        if self.bit_index < 0 {
            return false;
        }
        (self.frame >> self.bit_index) & 1 == 1
    }
}

impl Default for ThermocoupleModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Which line of the model a [`SimPin`] is attached to.
#[derive(Clone, Copy)]
pub enum SimPinRole {
    Sck,
    Cs,
    So,
}

/// One pin of the simulated converter. Clones share the device model.
#[derive(Clone)]
pub struct SimPin {
    role: SimPinRole,
    model: Arc<Mutex<ThermocoupleModel>>,
}

impl SimPin {
    fn set_level(&mut self, high: bool) {
        let mut model = self.model.lock().unwrap();
        match self.role {
            SimPinRole::Cs => {
                if model.cs_level && !high {
                    // Falling edge starts a shift-out and presents the dummy bit.
                    model.load_frame();
                }
                if !model.cs_level && high && model.bit_index <= 0 {
                    model.frames_read += 1;
                }
                model.cs_level = high;
            }
            SimPinRole::Sck => {
                if model.sck_level && !high && !model.cs_level {
                    // Next bit appears on the falling clock edge.
                    model.bit_index -= 1;
                }
                model.sck_level = high;
            }
            SimPinRole::So => {}
        }
    }
}

impl PinIo for SimPin {
    fn set_high(&mut self) {
        self.set_level(true);
    }

    fn set_low(&mut self) {
        self.set_level(false);
    }

    fn read_level(&self) -> bool {
        let model = self.model.lock().unwrap();
        match self.role {
            SimPinRole::So => model.so_level(),
            SimPinRole::Sck => model.sck_level,
            SimPinRole::Cs => model.cs_level,
        }
    }
}

/// Build the three pins of a simulated converter plus a handle to its model.
pub fn sim_thermocouple() -> (SimPin, SimPin, SimPin, Arc<Mutex<ThermocoupleModel>>) {
    let model = Arc::new(Mutex::new(ThermocoupleModel::new()));
    let pin = |role| SimPin {
        role,
        model: model.clone(),
    };
    (
        pin(SimPinRole::Sck),
        pin(SimPinRole::Cs),
        pin(SimPinRole::So),
        model,
    )
}

/// Manually advanced clock for tests and the simulator binary.
#[derive(Clone)]
pub struct TestClock {
    now_ms: Arc<AtomicU64>,
    epoch_base: i64,
}

impl TestClock {
    pub fn new(epoch_base: i64) -> Self {
        TestClock {
            now_ms: Arc::new(AtomicU64::new(0)),
            epoch_base,
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn monotonic_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn epoch_secs(&self) -> i64 {
        self.epoch_base + (self.now_ms.load(Ordering::SeqCst) / 1000) as i64
    }
}

/// Memory gauge whose reading is set from outside. The simulator binary pins
/// it high; store tests squeeze it to exercise eviction.
#[derive(Clone)]
pub struct SettableMemoryGauge {
    free: Arc<AtomicUsize>,
}

impl SettableMemoryGauge {
    pub fn new(free_bytes: usize) -> Self {
        SettableMemoryGauge {
            free: Arc::new(AtomicUsize::new(free_bytes)),
        }
    }

    pub fn set_free_bytes(&self, free_bytes: usize) {
        self.free.store(free_bytes, Ordering::SeqCst);
    }
}

impl MemoryGauge for SettableMemoryGauge {
    fn free_bytes(&self) -> usize {
        self.free.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_clock_advances() {
        let clock = TestClock::new(1_700_000_000);
        assert_eq!(clock.monotonic_ms(), 0);
        clock.advance_ms(1500);
        assert_eq!(clock.monotonic_ms(), 1500);
        assert_eq!(clock.epoch_secs(), 1_700_000_001);
    }

    #[test]
    fn test_sim_pin_shift_sequence() {
        let (mut sck, mut cs, so, model) = sim_thermocouple();
        model.lock().unwrap().set_code(0b1010_0000_0001);
        model.lock().unwrap().set_fault(false);

        cs.set_low();
        let mut bits = Vec::new();
        for _ in 0..12 {
            sck.set_high();
            sck.set_low();
            bits.push(so.read_level() as u16);
        }
        cs.set_high();

        let code = bits.iter().fold(0u16, |acc, b| (acc << 1) | b);
        assert_eq!(code, 0b1010_0000_0001);
    }
}
