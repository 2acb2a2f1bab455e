//! Fixed lookup tables: assist-level codes and wheel diameters

use serde::Serialize;

use crate::types::AssistLevel;

// =============================================================================
// Assist levels
// =============================================================================

const ASSIST_3: &[(u8, AssistLevel)] = &[
    (0, AssistLevel::Level(0)),
    (12, AssistLevel::Level(1)),
    (2, AssistLevel::Level(2)),
    (3, AssistLevel::Level(3)),
    (6, AssistLevel::Walk),
];

const ASSIST_4: &[(u8, AssistLevel)] = &[
    (0, AssistLevel::Level(0)),
    (1, AssistLevel::Level(1)),
    (12, AssistLevel::Level(2)),
    (21, AssistLevel::Level(3)),
    (3, AssistLevel::Level(4)),
    (6, AssistLevel::Walk),
];

const ASSIST_5: &[(u8, AssistLevel)] = &[
    (0, AssistLevel::Level(0)),
    (11, AssistLevel::Level(1)),
    (13, AssistLevel::Level(2)),
    (21, AssistLevel::Level(3)),
    (23, AssistLevel::Level(4)),
    (3, AssistLevel::Level(5)),
    (6, AssistLevel::Walk),
];

const ASSIST_9: &[(u8, AssistLevel)] = &[
    (0, AssistLevel::Level(0)),
    (1, AssistLevel::Level(1)),
    (11, AssistLevel::Level(2)),
    (12, AssistLevel::Level(3)),
    (13, AssistLevel::Level(4)),
    (2, AssistLevel::Level(5)),
    (21, AssistLevel::Level(6)),
    (22, AssistLevel::Level(7)),
    (23, AssistLevel::Level(8)),
    (3, AssistLevel::Level(9)),
    (6, AssistLevel::Walk),
];

/// Level count whose table is used; unsupported counts fall back to 5
pub fn effective_assist_levels(levels: u8) -> u8 {
    match levels {
        3 | 4 | 5 | 9 => levels,
        _ => 5,
    }
}

/// Code table for a display configured with `levels` assist levels
pub fn assist_table(levels: u8) -> &'static [(u8, AssistLevel)] {
    match effective_assist_levels(levels) {
        3 => ASSIST_3,
        4 => ASSIST_4,
        9 => ASSIST_9,
        _ => ASSIST_5,
    }
}

/// Map a raw assist code to a level; `None` if the table has no entry
pub fn assist_level_for_code(code: u8, levels: u8) -> Option<AssistLevel> {
    assist_table(levels)
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, level)| *level)
}

// =============================================================================
// Wheel diameters
// =============================================================================

/// Supported wheel size with its wire code and allowed circumference
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct WheelDiameter {
    /// Nominal size in inches, e.g. "27.5"
    pub label: &'static str,
    /// Inches × 16, little-endian
    #[serde(skip)]
    pub code: [u8; 2],
    /// mm
    pub min_circumference: u16,
    /// mm
    pub max_circumference: u16,
}

const fn wheel(label: &'static str, sixteenths: u16, min: u16, max: u16) -> WheelDiameter {
    WheelDiameter {
        label,
        code: [(sixteenths & 0xFF) as u8, (sixteenths >> 8) as u8],
        min_circumference: min,
        max_circumference: max,
    }
}

pub static WHEEL_DIAMETERS: &[WheelDiameter] = &[
    wheel("6", 96, 400, 600),
    wheel("8", 128, 520, 780),
    wheel("10", 160, 640, 1000),
    wheel("12", 192, 750, 1150),
    wheel("14", 224, 880, 1300),
    wheel("16", 256, 1000, 1500),
    wheel("17", 272, 1080, 1560),
    wheel("18", 288, 1150, 1650),
    wheel("20", 320, 1250, 1830),
    wheel("22", 352, 1400, 2000),
    wheel("23", 368, 1450, 2050),
    wheel("24", 384, 1520, 2130),
    wheel("25", 400, 1600, 2200),
    wheel("26", 416, 1660, 2300),
    wheel("27", 432, 1700, 2350),
    wheel("27.5", 440, 1750, 2400),
    wheel("28", 448, 1800, 2450),
    wheel("29", 464, 1850, 2500),
];

pub fn wheel_by_code(code: [u8; 2]) -> Option<&'static WheelDiameter> {
    WHEEL_DIAMETERS.iter().find(|w| w.code == code)
}

pub fn wheel_by_label(label: &str) -> Option<&'static WheelDiameter> {
    WHEEL_DIAMETERS.iter().find(|w| w.label == label)
}
