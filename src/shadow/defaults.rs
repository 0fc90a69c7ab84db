/// Power-on image of the page 0 registers `0x01..=0x33`.
///
/// Loaded into every shadow at construction and pushed to the chip by the
/// first reconciliation pass.
pub const CONTROL_DEFAULTS: [u8; 0x33] = [
    0x3F, // 01 power-down and reset
    0x00, // 02 global interrupt status (ro)
    0x31, // 03 port A control 1
    0x00, // 04 port A control 2
    0x31, // 05 port B control 1
    0x00, // 06 port B control 2
    0x00, // 07 transmitter control 1
    0x10, // 08 transmitter control 2
    0x00, // 09 transmitter control 3
    0x00, // 0A SRC and DIT status (ro)
    0x00, // 0B SRC and DIT interrupt mask
    0x00, // 0C SRC and DIT interrupt mode
    0x08, // 0D receiver control 1
    0x00, // 0E receiver control 2
    0x12, // 0F receiver PLL1 configuration 1
    0x00, // 10 receiver PLL1 configuration 2
    0x00, // 11 receiver PLL1 configuration 3
    0x00, // 12 non-PCM audio detection status (ro)
    0x00, // 13 receiver status 1 (ro)
    0x00, // 14 receiver status 2 (ro)
    0x00, // 15 receiver status 3 (ro)
    0x01, // 16 receiver interrupt mask 1
    0x00, // 17 receiver interrupt mask 2
    0x00, // 18 receiver interrupt mode 1
    0x00, // 19 receiver interrupt mode 2
    0x00, // 1A receiver interrupt mode 3
    0x01, // 1B GPO1 control
    0x00, // 1C GPO2 control
    0x0E, // 1D GPO3 control
    0x09, // 1E GPO4 control
    0x00, // 1F Q-channel sub-code 1 (ro)
    0x00, // 20 Q-channel sub-code 2 (ro)
    0x00, // 21 Q-channel sub-code 3 (ro)
    0x00, // 22 Q-channel sub-code 4 (ro)
    0x00, // 23 Q-channel sub-code 5 (ro)
    0x00, // 24 Q-channel sub-code 6 (ro)
    0x00, // 25 Q-channel sub-code 7 (ro)
    0x00, // 26 Q-channel sub-code 8 (ro)
    0x00, // 27 Q-channel sub-code 9 (ro)
    0x00, // 28 Q-channel sub-code 10 (ro)
    0x00, // 29 burst preamble PC high (ro)
    0x00, // 2A burst preamble PC low (ro)
    0x00, // 2B burst preamble PD high (ro)
    0x00, // 2C burst preamble PD low (ro)
    0x02, // 2D SRC control 1
    0x00, // 2E SRC control 2
    0x00, // 2F SRC control 3
    0x00, // 30 SRC control 4
    0x00, // 31 SRC control 5
    0x00, // 32 SRC ratio readback (ro)
    0x00, // 33 SRC ratio readback (ro)
];
