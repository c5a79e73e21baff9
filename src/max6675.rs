use crate::hal::{sleep_us, Clock, PinIo};

/// Hardware delay between triggering a conversion and the result being
/// ready to shift out.
pub const CONVERSION_PERIOD_MS: u64 = 220;

/// Temperature per code step, in degrees Celsius.
const DEG_C_PER_COUNT: f64 = 0.25;

/// Bit-banged driver for the MAX6675 thermocouple-to-digital converter.
///
/// Half-duplex 16-bit shift protocol over three lines: clock and chip-select
/// driven, data sensed. The converter runs free: finishing a read arms the
/// next conversion, and `read` returns the cached value until that
/// conversion has had [`CONVERSION_PERIOD_MS`] to complete.
pub struct Max6675<SCK, CS, SO, C> {
    sck: SCK,
    cs: CS,
    so: SO,
    clock: C,
    last_trigger_ms: u64,
    cached_temp: f64,
    fault: bool,
}

impl<SCK: PinIo, CS: PinIo, SO: PinIo, C: Clock> Max6675<SCK, CS, SO, C> {
    /// Take ownership of the three protocol pins and park them in their idle
    /// levels (clock low, chip-select high).
    pub fn new(mut sck: SCK, mut cs: CS, so: SO, clock: C) -> Self {
        sck.set_low();
        cs.set_high();
        Max6675 {
            sck,
            cs,
            so,
            clock,
            last_trigger_ms: 0,
            cached_temp: 0.0,
            fault: false,
        }
    }

    fn cycle_sck(&mut self) {
        self.sck.set_high();
        sleep_us(1);
        self.sck.set_low();
        sleep_us(1);
    }

    /// Start a new conversion by pulsing chip-select.
    pub fn refresh(&mut self) {
        self.cs.set_low();
        sleep_us(10);
        self.cs.set_high();
        self.last_trigger_ms = self.clock.monotonic_ms();
    }

    /// True once the conversion armed by the last trigger has completed.
    pub fn ready(&self) -> bool {
        self.clock.monotonic_ms() - self.last_trigger_ms > CONVERSION_PERIOD_MS
    }

    /// Open-thermocouple bit of the last completed read. Non-fatal: a set
    /// bit means the probe is damaged or loosely connected, but `read` keeps
    /// returning the last numeric value.
    pub fn error(&self) -> bool {
        self.fault
    }

    /// Return the current temperature in Celsius.
    ///
    /// If the in-flight conversion is not ready yet this returns the cached
    /// value without touching the pins, so polling faster than the
    /// conversion period is cheap. When ready, shifts out the 16-bit frame,
    /// updates the cache and the fault bit, and arms the next conversion.
    pub fn read(&mut self) -> f64 {
        if self.ready() {
            // Dropping chip-select presents the dummy sign bit (bit 15).
            self.cs.set_low();
            sleep_us(10);

            // Temperature bits 14..3, MSB first. The converter presents each
            // new bit on the falling clock edge.
            let mut code: u16 = 0;
            for i in 0..12 {
                self.cycle_sck();
                code += (self.so.read_level() as u16) << (11 - i);
            }

            // Bit 2 flags an open thermocouple input.
            self.cycle_sck();
            self.fault = self.so.read_level();

            // Two trailing bits complete the frame.
            for _ in 0..2 {
                self.cycle_sck();
            }

            // Raising chip-select arms the next conversion.
            self.cs.set_high();
            self.last_trigger_ms = self.clock.monotonic_ms();

            self.cached_temp = code as f64 * DEG_C_PER_COUNT;
        }

        self.cached_temp
    }

    /// `read`, converted to Fahrenheit.
    pub fn read_fahrenheit(&mut self) -> f64 {
        self.read() * 9.0 / 5.0 + 32.0
    }
}
