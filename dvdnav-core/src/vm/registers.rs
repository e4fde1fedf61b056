//! VM register file: 24 system parameters (SPRM) and 16 general parameters (GPRM).
//!
//! A GPRM in counter mode is a free running millisecond clock with a settable
//! offset. Reads return `(now - epoch) & 0xFFFF`; writes move the epoch so the
//! next read continues from the written value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::NavConfig;

pub const NUM_SPRM: usize = 24;
pub const NUM_GPRM: usize = 16;

/// SPRM slots addressable through a 5-bit selector. 24..=31 are reserved.
const SPRM_SLOTS: usize = 32;

// ============================================================================
// SPRM indices
// ============================================================================

pub const SPRM_MENU_LANG: usize = 0;
pub const SPRM_AUDIO_STREAM: usize = 1;
pub const SPRM_SPU_STREAM: usize = 2;
pub const SPRM_ANGLE: usize = 3;
pub const SPRM_TITLE: usize = 4;
pub const SPRM_VTS_TITLE: usize = 5;
pub const SPRM_TITLE_PGC: usize = 6;
pub const SPRM_PART: usize = 7;
pub const SPRM_HIGHLIGHT_BUTTON: usize = 8;
pub const SPRM_NAV_TIMER: usize = 9;
pub const SPRM_TIMER_PGC: usize = 10;
pub const SPRM_COUNTRY: usize = 12;
pub const SPRM_PARENTAL_LEVEL: usize = 13;
pub const SPRM_VIDEO_PREF: usize = 14;
pub const SPRM_AUDIO_CAPS: usize = 15;
pub const SPRM_AUDIO_LANG: usize = 16;
pub const SPRM_SPU_LANG: usize = 18;
pub const SPRM_REGION: usize = 20;

// ============================================================================
// Clocks
// ============================================================================

/// Millisecond time source for GPRM counters.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall clock, counting from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Register file
// ============================================================================

#[derive(Clone)]
pub struct Registers {
    sprm: [u16; SPRM_SLOTS],
    gprm: [u16; NUM_GPRM],
    gprm_counter: [bool; NUM_GPRM],
    gprm_epoch: [u64; NUM_GPRM],
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registers")
            .field("sprm", &&self.sprm[..NUM_SPRM])
            .field("gprm", &self.gprm)
            .field("gprm_counter", &self.gprm_counter)
            .finish()
    }
}

impl Registers {
    /// All registers zero, every GPRM in register mode.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sprm: [0; SPRM_SLOTS],
            gprm: [0; NUM_GPRM],
            gprm_counter: [false; NUM_GPRM],
            gprm_epoch: [0; NUM_GPRM],
            clock,
        }
    }

    /// Player power-on values.
    pub fn with_defaults(clock: Arc<dyn Clock>, config: &NavConfig) -> Self {
        let mut regs = Self::new(clock);
        regs.reset(config);
        regs
    }

    pub fn reset(&mut self, config: &NavConfig) {
        self.sprm = [0; SPRM_SLOTS];
        self.gprm = [0; NUM_GPRM];
        self.gprm_counter = [false; NUM_GPRM];
        self.gprm_epoch = [0; NUM_GPRM];

        self.sprm[SPRM_MENU_LANG] = lang_code(&config.menu_language);
        self.sprm[SPRM_AUDIO_STREAM] = 15;
        self.sprm[SPRM_SPU_STREAM] = 62;
        self.sprm[SPRM_ANGLE] = 1;
        self.sprm[SPRM_TITLE] = 1;
        self.sprm[SPRM_VTS_TITLE] = 1;
        self.sprm[SPRM_PART] = 1;
        self.sprm[SPRM_HIGHLIGHT_BUTTON] = 1 << 10;
        self.sprm[SPRM_COUNTRY] = lang_code(&config.country_code);
        self.sprm[SPRM_PARENTAL_LEVEL] = config.parental_level;
        self.sprm[SPRM_VIDEO_PREF] = if config.pan_scan { 0x100 } else { 0 };
        self.sprm[SPRM_AUDIO_CAPS] = 0x7CFC;
        self.sprm[SPRM_AUDIO_LANG] = lang_code(&config.audio_language);
        self.sprm[SPRM_SPU_LANG] = lang_code(&config.spu_language);
        self.sprm[SPRM_REGION] = config.region_mask;
    }

    pub fn sprm(&self, index: usize) -> u16 {
        self.sprm[index & 0x1F]
    }

    pub fn set_sprm(&mut self, index: usize, value: u16) {
        self.sprm[index & 0x1F] = value;
    }

    pub fn sprms(&self) -> &[u16] {
        &self.sprm[..NUM_SPRM]
    }

    pub fn gprm(&self, index: usize) -> u16 {
        let index = index & 0x0F;
        if self.gprm_counter[index] {
            let elapsed = self.clock.now_millis().wrapping_sub(self.gprm_epoch[index]);
            (elapsed & 0xFFFF) as u16
        } else {
            self.gprm[index]
        }
    }

    pub fn set_gprm(&mut self, index: usize, value: u16) {
        let index = index & 0x0F;
        if self.gprm_counter[index] {
            self.gprm_epoch[index] = self.clock.now_millis().wrapping_sub(u64::from(value));
        }
        self.gprm[index] = value;
    }

    pub fn is_counter(&self, index: usize) -> bool {
        self.gprm_counter[index & 0x0F]
    }

    /// Switches a GPRM between register and counter mode. The stored value is
    /// not rebased; the next write does that.
    pub fn set_counter_mode(&mut self, index: usize, counter: bool) {
        self.gprm_counter[index & 0x0F] = counter;
    }

    /// Reads through an 8-bit selector: bit 7 picks SPRM (low 5 bits), else GPRM (low 4 bits).
    pub fn read_selector(&self, selector: u8) -> u16 {
        if selector & 0x80 != 0 {
            let index = (selector & 0x1F) as usize;
            if index == SPRM_REGION {
                tracing::debug!(target: "dvdnav::vm", "disc reads the region mask register");
            }
            self.sprm(index)
        } else {
            self.gprm((selector & 0x0F) as usize)
        }
    }

    pub fn write_selector(&mut self, selector: u8, value: u16) {
        if selector & 0x80 != 0 {
            self.set_sprm((selector & 0x1F) as usize, value);
        } else {
            self.set_gprm((selector & 0x0F) as usize, value);
        }
    }

    // Convenience accessors for the bookkeeping registers.

    pub fn highlighted_button(&self) -> u16 {
        self.sprm[SPRM_HIGHLIGHT_BUTTON] >> 10
    }

    pub fn set_highlighted_button(&mut self, button: u16) {
        self.sprm[SPRM_HIGHLIGHT_BUTTON] = button << 10;
    }

    pub fn angle(&self) -> u16 {
        self.sprm[SPRM_ANGLE]
    }
}

/// Packs a two letter ISO 639 / 3166 code into a register value.
pub fn lang_code(code: &str) -> u16 {
    let bytes = code.as_bytes();
    match bytes {
        [a, b, ..] => (u16::from(*a) << 8) | u16::from(*b),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers() -> (Registers, ManualClock) {
        let clock = ManualClock::new();
        clock.set(10_000);
        let regs = Registers::with_defaults(Arc::new(clock.clone()), &NavConfig::default());
        (regs, clock)
    }

    #[test]
    fn power_on_defaults() {
        let (regs, _) = registers();
        assert_eq!(regs.sprm(SPRM_MENU_LANG), u16::from_be_bytes(*b"en"));
        assert_eq!(regs.sprm(SPRM_AUDIO_STREAM), 15);
        assert_eq!(regs.sprm(SPRM_SPU_STREAM), 62);
        assert_eq!(regs.sprm(SPRM_ANGLE), 1);
        assert_eq!(regs.highlighted_button(), 1);
        assert_eq!(regs.sprm(SPRM_PARENTAL_LEVEL), 15);
        assert_eq!(regs.sprm(SPRM_COUNTRY), u16::from_be_bytes(*b"US"));
        assert_eq!(regs.sprm(SPRM_VIDEO_PREF), 0x100);
        assert_eq!(regs.sprm(SPRM_AUDIO_CAPS), 0x7CFC);
        assert_eq!(regs.sprm(SPRM_REGION), 1);
    }

    #[test]
    fn selector_addressing_covers_every_byte() {
        let (mut regs, _) = registers();
        for selector in 0..=255u8 {
            let value = 0x1000 | u16::from(selector);
            regs.write_selector(selector, value);
            assert_eq!(regs.read_selector(selector), value, "selector {selector:#04x}");
            if selector & 0x80 != 0 {
                assert_eq!(regs.sprm((selector & 0x1F) as usize), value);
            } else {
                assert_eq!(regs.gprm((selector & 0x0F) as usize), value);
            }
        }
        // aliases hit the same slot
        regs.write_selector(0x03, 7);
        assert_eq!(regs.read_selector(0x73), 7);
        regs.write_selector(0x81, 9);
        assert_eq!(regs.read_selector(0xE1), 9);
    }

    #[test]
    fn counter_mode_runs_from_written_value() {
        let (mut regs, clock) = registers();
        regs.set_counter_mode(0, true);
        regs.set_gprm(0, 100);
        assert_eq!(regs.gprm(0), 100);
        clock.advance(50);
        assert_eq!(regs.gprm(0), 150);

        regs.set_gprm(0, 0xFFFF);
        clock.advance(2);
        assert_eq!(regs.gprm(0), 1);
    }

    #[test]
    fn register_mode_ignores_clock() {
        let (mut regs, clock) = registers();
        regs.set_gprm(4, 42);
        clock.advance(1_000);
        assert_eq!(regs.gprm(4), 42);
        assert!(!regs.is_counter(4));
    }

    #[test]
    fn lang_codes() {
        assert_eq!(lang_code("fr"), 0x6672);
        assert_eq!(lang_code(""), 0);
    }
}
