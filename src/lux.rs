//! Fixed-point lux approximation
//!
//! Follows the integer procedure of the TSL2560/TSL2561 datasheet: both
//! channels are normalised to the 402ms / 16x reference, the IR ratio picks a
//! segment of a piecewise-linear model, and the segment's coefficients turn
//! the channels into lux. No floating point is involved.
//!
//! Intermediates are kept in 64 bits. The datasheet's 32-bit arithmetic wraps
//! for bright light at 1x gain and 13.7ms integration; everywhere else the
//! results are identical.

use crate::{DeviceType, Gain, IntegrationTime, Timing};

/// Channel values are scaled by 2^CH_SCALE
pub const CH_SCALE: u32 = 10;
/// 322/11 * 2^CH_SCALE, normalises 13.7ms integration to 402ms
pub const CH_SCALE_TINT0: u32 = 0x7517;
/// 322/81 * 2^CH_SCALE, normalises 101ms integration to 402ms
pub const CH_SCALE_TINT1: u32 = 0x0FE7;
/// The channel ratio is scaled by 2^RATIO_SCALE
pub const RATIO_SCALE: u32 = 9;
/// Coefficients are scaled by 2^LUX_SCALE
pub const LUX_SCALE: u32 = 14;

/// One segment of the piecewise-linear lux model
///
/// A segment applies to ratios up to and including `k`; lux is then
/// `ch0 * b - ch1 * m`, scaled by 2^[`LUX_SCALE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Coefficients {
    /// Upper ratio breakpoint
    pub k: u16,
    /// Broadband channel coefficient
    pub b: u16,
    /// IR channel coefficient
    pub m: u16,
}

const fn row(k: u16, b: u16, m: u16) -> Coefficients {
    Coefficients { k, b, m }
}

/// Coefficients for the T (TMB-6), FN (DFN-6) and CL (ChipLED-6) packages
pub const T_FN_CL_COEFFICIENTS: [Coefficients; 8] = [
    row(0x0040, 0x01F2, 0x01BE),
    row(0x0080, 0x0214, 0x02D1),
    row(0x00C0, 0x023F, 0x037B),
    row(0x0100, 0x0270, 0x03FE),
    row(0x0138, 0x016F, 0x01FC),
    row(0x019A, 0x00D2, 0x00FB),
    row(0x029A, 0x0018, 0x0012),
    row(0x029A, 0x0000, 0x0000),
];

/// Coefficients for the CS (Chipscale) package
pub const CS_COEFFICIENTS: [Coefficients; 8] = [
    row(0x0043, 0x0204, 0x01AD),
    row(0x0085, 0x0228, 0x02C1),
    row(0x00C8, 0x0253, 0x0363),
    row(0x010A, 0x0282, 0x03DF),
    row(0x014D, 0x0177, 0x01DD),
    row(0x019A, 0x0101, 0x0127),
    row(0x029A, 0x0037, 0x002B),
    row(0x029A, 0x0000, 0x0000),
];

const T_FN_CL_BREAKPOINTS: [u16; 7] = [
    T_FN_CL_COEFFICIENTS[0].k,
    T_FN_CL_COEFFICIENTS[1].k,
    T_FN_CL_COEFFICIENTS[2].k,
    T_FN_CL_COEFFICIENTS[3].k,
    T_FN_CL_COEFFICIENTS[4].k,
    T_FN_CL_COEFFICIENTS[5].k,
    T_FN_CL_COEFFICIENTS[6].k,
];

// Segments 5 to 7 of the CS model are matched against the T/FN/CL breakpoints.
const CS_BREAKPOINTS: [u16; 7] = [
    CS_COEFFICIENTS[0].k,
    CS_COEFFICIENTS[1].k,
    CS_COEFFICIENTS[2].k,
    CS_COEFFICIENTS[3].k,
    T_FN_CL_COEFFICIENTS[4].k,
    T_FN_CL_COEFFICIENTS[5].k,
    T_FN_CL_COEFFICIENTS[6].k,
];

/// Which coefficient table a lux computation uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum LuxTable {
    /// Chipscale package table
    Cs,
    /// T/FN/CL package table
    TFnCl,
}

impl LuxTable {
    /// Table used for a detected device
    ///
    /// Only the device type code 1 ([`DeviceType::Tsl2561Cs`]) selects the
    /// CS table. [`DeviceType::Tsl2560Cs`] shares the T/FN/CL table with
    /// every other type, [`DeviceType::Invalid`] included.
    pub fn for_device(device_type: DeviceType) -> Self {
        match device_type.code() {
            1 => LuxTable::Cs,
            _ => LuxTable::TFnCl,
        }
    }

    /// The eight segments of this table
    pub fn coefficients(self) -> &'static [Coefficients; 8] {
        match self {
            LuxTable::Cs => &CS_COEFFICIENTS,
            LuxTable::TFnCl => &T_FN_CL_COEFFICIENTS,
        }
    }

    fn breakpoints(self) -> &'static [u16; 7] {
        match self {
            LuxTable::Cs => &CS_BREAKPOINTS,
            LuxTable::TFnCl => &T_FN_CL_BREAKPOINTS,
        }
    }

    /// Segment for a channel ratio scaled by 2^[`RATIO_SCALE`]
    ///
    /// Ratios above the seventh breakpoint land on the last segment, which
    /// yields zero lux.
    pub fn select(self, ratio: u64) -> Coefficients {
        let rows = self.coefficients();
        self.breakpoints()
            .iter()
            .position(|&k| ratio <= u64::from(k))
            .map_or(rows[7], |i| rows[i])
    }
}

/// Factor normalising a channel count to 402ms integration and 16x gain,
/// scaled by 2^[`CH_SCALE`]
pub fn channel_scale(timing: Timing) -> u32 {
    let scale = match timing.integration {
        IntegrationTime::Short => CH_SCALE_TINT0,
        IntegrationTime::Medium => CH_SCALE_TINT1,
        IntegrationTime::Long => 1 << CH_SCALE,
    };
    match timing.gain {
        Gain::X1 => scale << 4,
        Gain::X16 => scale,
    }
}

/// IR to broadband ratio, scaled by 2^[`RATIO_SCALE`] and rounded
pub fn channel_ratio(c0: u64, c1: u64) -> u64 {
    if c0 == 0 {
        return 0;
    }
    let ratio = (c1 << (RATIO_SCALE + 1)) / c0;
    (ratio + 1) >> 1
}

/// Approximate illuminance in lux
///
/// `visible` and `infrared` are the values published by a read cycle; the
/// broadband count is recovered as their 16-bit wrapping sum.
pub fn compute_lux(device_type: DeviceType, timing: Timing, visible: u16, infrared: u16) -> u32 {
    let ch0 = u64::from(visible.wrapping_add(infrared));
    let ch1 = u64::from(infrared);

    let scale = u64::from(channel_scale(timing));
    let c0 = (ch0 * scale) >> CH_SCALE;
    let c1 = (ch1 * scale) >> CH_SCALE;

    let ratio = channel_ratio(c0, c1);
    let segment = LuxTable::for_device(device_type).select(ratio);

    // negative results clamp to zero
    let temp = (c0 * u64::from(segment.b)).saturating_sub(c1 * u64::from(segment.m));
    let temp = temp + (1 << (LUX_SCALE - 1));

    u32::try_from(temp >> LUX_SCALE).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    const ALL_DEVICES: [DeviceType; 5] = [
        DeviceType::Tsl2560Cs,
        DeviceType::Tsl2561Cs,
        DeviceType::Tsl2560TFnCl,
        DeviceType::Tsl2561TFnCl,
        DeviceType::Invalid,
    ];

    fn timing(integration: IntegrationTime, gain: Gain) -> Timing {
        Timing { integration, gain }
    }

    #[test]
    fn test_channel_scale() {
        use Gain::*;
        use IntegrationTime::*;
        assert_eq!(channel_scale(timing(Short, X16)), 0x7517);
        assert_eq!(channel_scale(timing(Medium, X16)), 0x0FE7);
        assert_eq!(channel_scale(timing(Long, X16)), 0x0400);
        assert_eq!(channel_scale(timing(Short, X1)), 0x7517 << 4);
        assert_eq!(channel_scale(timing(Medium, X1)), 0x0FE7 << 4);
        assert_eq!(channel_scale(timing(Long, X1)), 0x4000);
    }

    #[test]
    fn test_ratio_rounds_to_nearest() {
        assert_eq!(channel_ratio(0, 1234), 0);
        // 3200 / 16000 * 512 = 102.4
        assert_eq!(channel_ratio(16000, 3200), 102);
        // 1 / 3 * 512 = 170.67
        assert_eq!(channel_ratio(3, 1), 171);
        assert_eq!(channel_ratio(100, 100), 512);
    }

    #[test]
    fn test_table_family_selection() {
        assert_eq!(LuxTable::for_device(DeviceType::Tsl2561Cs), LuxTable::Cs);
        assert_eq!(LuxTable::for_device(DeviceType::Tsl2560Cs), LuxTable::TFnCl);
        assert_eq!(LuxTable::for_device(DeviceType::Tsl2560TFnCl), LuxTable::TFnCl);
        assert_eq!(LuxTable::for_device(DeviceType::Tsl2561TFnCl), LuxTable::TFnCl);
        assert_eq!(LuxTable::for_device(DeviceType::Invalid), LuxTable::TFnCl);
    }

    #[test]
    fn test_breakpoints_are_inclusive() {
        let t = LuxTable::TFnCl;
        assert_eq!(t.select(0), T_FN_CL_COEFFICIENTS[0]);
        assert_eq!(t.select(0x40), T_FN_CL_COEFFICIENTS[0]);
        assert_eq!(t.select(0x41), T_FN_CL_COEFFICIENTS[1]);
        assert_eq!(t.select(0x29A), T_FN_CL_COEFFICIENTS[6]);
        assert_eq!(t.select(0x29B), T_FN_CL_COEFFICIENTS[7]);
        assert_eq!(t.select(u64::MAX), T_FN_CL_COEFFICIENTS[7]);
    }

    #[test]
    fn test_cs_upper_segments_use_t_fn_cl_breakpoints() {
        let cs = LuxTable::Cs;
        assert_eq!(cs.select(0x10A), CS_COEFFICIENTS[3]);
        assert_eq!(cs.select(0x138), CS_COEFFICIENTS[4]);
        // above K5T but below K5C: the sixth CS segment, not the fifth
        assert_eq!(cs.select(0x139), CS_COEFFICIENTS[5]);
        assert_eq!(cs.select(0x14D), CS_COEFFICIENTS[5]);
        assert_eq!(cs.select(0x29A), CS_COEFFICIENTS[6]);
        assert_eq!(cs.select(0x29B), CS_COEFFICIENTS[7]);
    }

    #[test]
    fn test_golden_trace() {
        use DeviceType::*;
        use Gain::*;
        use IntegrationTime::*;

        // (visible, infrared, device, integration, gain, lux)
        let grid: &[(u16, u16, DeviceType, IntegrationTime, Gain, u32)] = &[
            (0, 0, Tsl2560TFnCl, Long, X1, 0),
            // c0 = 16000, c1 = 3200, ratio 102, segment 2
            (800, 200, Tsl2560TFnCl, Long, X1, 379),
            // ratio 512, segment 7
            (0, 5000, Tsl2560TFnCl, Long, X1, 29),
            // ch1 > ch0: ratio 1024, segment 8
            (64536, 2000, Tsl2560TFnCl, Long, X1, 0),
            (64536, 2000, Tsl2561Cs, Long, X1, 0),
            // c0 = 1987, c1 = 397, ratio 102
            (400, 100, Tsl2561Cs, Medium, X16, 50),
            // Short/X1 just below the 32-bit product limit, where a 32-bit model agrees
            (8900, 0, Tsl2560TFnCl, Short, X1, 126701),
            (7000, 1900, Tsl2560TFnCl, Short, X1, 96190),
            (7000, 1900, Tsl2561Cs, Short, X1, 102148),
            // c0 = 30693931 overflows 32-bit products
            (0xFFFE, 1, Tsl2560TFnCl, Short, X1, 932945),
            (0xFFFF, 0, Tsl2560TFnCl, Short, X1, 932958),
            (1000, 0, Tsl2560TFnCl, Long, X1, 486),
            (1000, 0, Tsl2561Cs, Long, X1, 504),
            (1000, 0, Tsl2560Cs, Long, X1, 486),
            (1000, 0, Tsl2561TFnCl, Long, X1, 486),
            (1000, 0, Invalid, Long, X1, 486),
            // ratio 128, segment 2 of the CS table
            (300, 100, Tsl2561Cs, Long, X16, 9),
            // ratio 205, segment 4
            (600, 400, Tsl2561Cs, Long, X16, 15),
            (600, 400, Tsl2560TFnCl, Long, X16, 13),
            // ratio 133
            (37, 13, Tsl2561TFnCl, Short, X16, 31),
            (37, 13, Tsl2561TFnCl, Medium, X1, 67),
            (12000, 3000, Tsl2561Cs, Short, X16, 11015),
            (12000, 3000, Tsl2560TFnCl, Short, X16, 10393),
            // ratio 192
            (100, 60, Tsl2561Cs, Long, X1, 42),
            (100, 60, Tsl2560TFnCl, Long, X1, 38),
            (1234, 321, Tsl2560Cs, Medium, X16, 145),
            (50000, 15000, Tsl2560TFnCl, Long, X16, 1451),
            // ratio 307, segment 5
            (200, 300, Tsl2561Cs, Long, X16, 3),
            // ratio 320, sixth CS segment
            (300, 500, Tsl2561Cs, Long, X16, 4),
            (300, 500, Tsl2560TFnCl, Long, X16, 3),
            (400, 400, Tsl2561Cs, Long, X16, 7),
        ];

        for &(visible, infrared, device, integration, gain, expected) in grid {
            assert_eq!(
                compute_lux(device, timing(integration, gain), visible, infrared),
                expected,
                "visible={visible} infrared={infrared} {device:?} {integration:?} {gain:?}"
            );
        }
    }

    fn arbitrary_setup(device: u8, integration: u8, gain: bool) -> (DeviceType, Timing) {
        let device = ALL_DEVICES[usize::from(device) % ALL_DEVICES.len()];
        let integration = match integration % 3 {
            0 => IntegrationTime::Short,
            1 => IntegrationTime::Medium,
            _ => IntegrationTime::Long,
        };
        let gain = if gain { Gain::X16 } else { Gain::X1 };
        (device, timing(integration, gain))
    }

    quickcheck! {
        fn prop_is_deterministic(visible: u16, infrared: u16, device: u8, integration: u8, gain: bool) -> bool {
            let (device, timing) = arbitrary_setup(device, integration, gain);
            compute_lux(device, timing, visible, infrared)
                == compute_lux(device, timing, visible, infrared)
        }

        fn prop_no_light_is_zero_lux(infrared: u16, device: u8, integration: u8, gain: bool) -> bool {
            let (device, timing) = arbitrary_setup(device, integration, gain);
            let visible = 0u16.wrapping_sub(infrared);
            compute_lux(device, timing, visible, infrared) == 0
        }

        fn prop_negative_model_clamps_to_zero(visible: u16, infrared: u16, device: u8, integration: u8, gain: bool) -> bool {
            let (device, timing) = arbitrary_setup(device, integration, gain);
            let scale = u64::from(channel_scale(timing));
            let c0 = (u64::from(visible.wrapping_add(infrared)) * scale) >> CH_SCALE;
            let c1 = (u64::from(infrared) * scale) >> CH_SCALE;
            let segment = LuxTable::for_device(device).select(channel_ratio(c0, c1));
            if c1 * u64::from(segment.m) > c0 * u64::from(segment.b) {
                compute_lux(device, timing, visible, infrared) == 0
            } else {
                true
            }
        }
    }
}
