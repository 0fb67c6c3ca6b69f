//! Attenuation and Log-Domain Tables
//!
//! Process-wide, read-only lookup tables shared by every engine instance.
//! The ROM-derived tables are computed on first use (`OnceLock`) and never
//! mutated again; the OPM frequency ROM is a literal constant.
//!
//! Units:
//! - Attenuation is expressed in 4.8 fixed point (1/256 of a doubling), as the
//!   hardware stores it in its log-sin ROM
//! - Envelope attenuation is 10-bit (4.6) and shifted up by 2 before mixing
//! - Volume is 13-bit linear magnitude plus sign

use std::sync::OnceLock;

/// Number of entries in the quarter-wave log-sin table
pub const SIN_TABLE_SIZE: usize = 256;

/// Number of entries in one full waveform period
pub const WAVEFORM_LENGTH: usize = 1024;

/// Number of distinct waveforms the engine can produce
pub const WAVEFORMS: usize = 8;

static SIN_TABLE: OnceLock<[u16; SIN_TABLE_SIZE]> = OnceLock::new();
static POWER_TABLE: OnceLock<[u16; 256]> = OnceLock::new();
static WAVEFORM_TABLE: OnceLock<[[u16; WAVEFORM_LENGTH]; WAVEFORMS]> = OnceLock::new();

/// Extract `length` bits of `value` starting at bit `start`
#[inline]
pub fn bitfield(value: u32, start: u32, length: u32) -> u32 {
    (value >> start) & ((1 << length) - 1)
}

/// Quarter-wave log-sin table: `-log2(sin(x)) * 256` at the bin centres
fn sin_table() -> &'static [u16; SIN_TABLE_SIZE] {
    SIN_TABLE.get_or_init(|| {
        let mut table = [0u16; SIN_TABLE_SIZE];
        for (i, entry) in table.iter_mut().enumerate() {
            let phase = ((2 * i + 1) as f64) * std::f64::consts::PI / 1024.0;
            *entry = (-phase.sin().log2() * 256.0).round() as u16;
        }
        table
    })
}

/// Linear power table: `2^((255 - i) / 256)` in 11.2 fixed point
fn power_table() -> &'static [u16; 256] {
    POWER_TABLE.get_or_init(|| {
        let mut table = [0u16; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let exp = ((2.0f64.powf((255 - i) as f64 / 256.0) - 1.0) * 1024.0).round() as u16;
            *entry = (exp | 0x400) << 2;
        }
        table
    })
}

/// Attenuation of the absolute sine for a 10-bit phase index (bit 9 ignored)
#[inline]
pub fn abs_sin_attenuation(input: u32) -> u32 {
    let index = if bitfield(input, 8, 1) != 0 { !input } else { input };
    u32::from(sin_table()[(index & 0xff) as usize])
}

/// Convert a 4.8 attenuation into a 13-bit linear magnitude
#[inline]
pub fn attenuation_to_volume(input: u32) -> u32 {
    let power = u32::from(power_table()[(input & 0xff) as usize]);
    power.checked_shr(input >> 8).unwrap_or(0)
}

/// All eight waveforms as sign-and-attenuation words (bit 15 is the sign)
///
/// - 0: sine
/// - 1: half sine
/// - 2: absolute sine
/// - 3: quarter sine (pulse sine)
/// - 4: alternating sine, first half only
/// - 5: camel sine, first half only
/// - 6: square
/// - 7: logarithmic sawtooth
fn waveform_table() -> &'static [[u16; WAVEFORM_LENGTH]; WAVEFORMS] {
    WAVEFORM_TABLE.get_or_init(|| {
        let mut waves = [[0u16; WAVEFORM_LENGTH]; WAVEFORMS];
        for index in 0..WAVEFORM_LENGTH as u32 {
            waves[0][index as usize] =
                (abs_sin_attenuation(index) | (bitfield(index, 9, 1) << 15)) as u16;
        }

        let zero = waves[0][0];
        for index in 0..WAVEFORM_LENGTH {
            let sine = waves[0][index];
            let upper = index & 0x200 != 0;
            waves[1][index] = if upper { zero } else { sine };
            waves[2][index] = sine & 0x7fff;
            waves[3][index] = if index & 0x100 != 0 { zero } else { sine & 0x7fff };
            waves[4][index] = if upper { zero } else { waves[0][(index * 2) % WAVEFORM_LENGTH] };
            waves[5][index] = if upper { zero } else { waves[0][(index * 2) & 0x1ff] };
            waves[6][index] = if upper { 0x8000 } else { 0 };
            let saw = if upper { index ^ 0x13ff } else { index };
            waves[7][index] = ((saw << 3) & 0xffff) as u16;
        }
        waves
    })
}

/// Fetch one waveform, clamped to the valid selector range
#[inline]
pub fn waveform(select: usize) -> &'static [u16; WAVEFORM_LENGTH] {
    &waveform_table()[select.min(WAVEFORMS - 1)]
}

/// Envelope increment table: one row per effective rate, 8 nibbles per row
const ATTENUATION_INCREMENTS: [u32; 64] = [
    0x00000000, 0x00000000, 0x10101010, 0x10101010, // 0-3
    0x10101010, 0x10101010, 0x11101110, 0x11101110, // 4-7
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 8-11
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 12-15
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 16-19
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 20-23
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 24-27
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 28-31
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 32-35
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 36-39
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 40-43
    0x10101010, 0x10111010, 0x11101110, 0x11111110, // 44-47
    0x11111111, 0x21112111, 0x21212121, 0x22212221, // 48-51
    0x22222222, 0x42224222, 0x42424242, 0x44424442, // 52-55
    0x44444444, 0x84448444, 0x84848484, 0x88848884, // 56-59
    0x88888888, 0x88888888, 0x88888888, 0x88888888, // 60-63
];

/// Attenuation step for a 6-bit rate at the given 3-bit sub-step position
#[inline]
pub fn attenuation_increment(rate: u32, index: u32) -> u32 {
    bitfield(ATTENUATION_INCREMENTS[(rate & 63) as usize], 4 * (index & 7), 4)
}

/// OPM/OPN detune deltas indexed by 5-bit keycode and 2-bit detune magnitude
const DETUNE_TABLE: [[u8; 4]; 32] = [
    [0, 0, 1, 2],
    [0, 0, 1, 2],
    [0, 0, 1, 2],
    [0, 0, 1, 2],
    [0, 1, 2, 2],
    [0, 1, 2, 3],
    [0, 1, 2, 3],
    [0, 1, 2, 3],
    [0, 1, 2, 4],
    [0, 1, 3, 4],
    [0, 1, 3, 4],
    [0, 1, 3, 5],
    [0, 2, 4, 5],
    [0, 2, 4, 6],
    [0, 2, 4, 6],
    [0, 2, 5, 7],
    [0, 2, 5, 8],
    [0, 3, 6, 8],
    [0, 3, 6, 9],
    [0, 3, 7, 10],
    [0, 4, 8, 11],
    [0, 4, 8, 12],
    [0, 4, 9, 13],
    [0, 5, 10, 14],
    [0, 5, 11, 16],
    [0, 6, 12, 17],
    [0, 6, 13, 19],
    [0, 7, 14, 20],
    [0, 8, 16, 22],
    [0, 8, 16, 22],
    [0, 8, 16, 22],
    [0, 8, 16, 22],
];

/// Signed detune adjustment; bit 2 of `detune` selects the negative direction
#[inline]
pub fn detune_adjustment(detune: u32, keycode: u32) -> i32 {
    let magnitude = i32::from(DETUNE_TABLE[(keycode & 0x1f) as usize][(detune & 3) as usize]);
    if bitfield(detune, 2, 1) != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// OPL-style key scale attenuation (4.6 units) for a block and the top 4 fnum bits
#[inline]
pub fn opl_key_scale_atten(block: u32, fnum_4msb: u32) -> u32 {
    const FNUM_TO_ATTEN: [u8; 16] = [0, 24, 32, 37, 40, 43, 45, 47, 48, 50, 51, 52, 53, 54, 55, 56];
    let result = i32::from(FNUM_TO_ATTEN[(fnum_4msb & 15) as usize]) - 8 * ((block ^ 7) as i32);
    result.max(0) as u32
}

/// Effective envelope rate: zero stays zero, otherwise add KSR and clamp to 63
#[inline]
pub fn effective_rate(rawrate: u32, ksr: u32) -> u32 {
    if rawrate == 0 {
        0
    } else {
        (rawrate + ksr).min(63)
    }
}

/// Phase steps for one octave of OPM key codes in 1/64 semitone units
///
/// x.11 steps at block 7, as stored in the YM2151 frequency ROM: 48 segments
/// of 16 entries, each a base value plus a slope applied in quarter steps.
const OPM_PHASE_STEP: [u32; 768] = [
    41568, 41600, 41632, 41664, 41696, 41728, 41760, 41792, 41856, 41888, 41920, 41952, 42016, 42048, 42080, 42112,
    42176, 42208, 42240, 42272, 42304, 42336, 42368, 42400, 42464, 42496, 42528, 42560, 42624, 42656, 42688, 42720,
    42784, 42816, 42848, 42880, 42912, 42944, 42976, 43008, 43072, 43104, 43136, 43168, 43232, 43264, 43296, 43328,
    43392, 43424, 43456, 43488, 43552, 43584, 43616, 43648, 43712, 43744, 43776, 43808, 43872, 43904, 43936, 43968,
    44032, 44064, 44096, 44128, 44192, 44224, 44256, 44288, 44352, 44384, 44416, 44448, 44512, 44544, 44576, 44608,
    44672, 44704, 44736, 44768, 44832, 44864, 44896, 44928, 44992, 45024, 45056, 45088, 45152, 45184, 45216, 45248,
    45312, 45344, 45376, 45408, 45472, 45504, 45536, 45568, 45632, 45664, 45696, 45728, 45792, 45824, 45856, 45888,
    45984, 46016, 46048, 46080, 46144, 46176, 46208, 46240, 46304, 46336, 46368, 46400, 46464, 46496, 46528, 46560,
    46656, 46688, 46720, 46752, 46816, 46848, 46880, 46912, 46976, 47008, 47040, 47072, 47136, 47168, 47200, 47232,
    47328, 47360, 47392, 47424, 47488, 47520, 47552, 47584, 47680, 47712, 47744, 47776, 47840, 47872, 47904, 47936,
    48032, 48064, 48096, 48128, 48192, 48224, 48256, 48288, 48384, 48416, 48448, 48480, 48544, 48576, 48608, 48640,
    48736, 48768, 48800, 48832, 48896, 48928, 48960, 48992, 49088, 49120, 49152, 49184, 49248, 49280, 49312, 49344,
    49440, 49472, 49504, 49536, 49600, 49632, 49664, 49696, 49792, 49824, 49856, 49888, 49952, 49984, 50016, 50048,
    50144, 50176, 50208, 50240, 50304, 50336, 50368, 50400, 50496, 50528, 50560, 50592, 50688, 50720, 50752, 50784,
    50880, 50912, 50944, 50976, 51040, 51072, 51104, 51136, 51232, 51264, 51296, 51328, 51424, 51456, 51488, 51520,
    51616, 51648, 51680, 51712, 51808, 51840, 51872, 51904, 52000, 52032, 52064, 52096, 52192, 52224, 52256, 52288,
    52384, 52416, 52448, 52480, 52576, 52608, 52640, 52672, 52768, 52800, 52832, 52864, 52960, 52992, 53024, 53056,
    53152, 53184, 53216, 53248, 53344, 53376, 53408, 53440, 53536, 53568, 53600, 53632, 53728, 53760, 53792, 53824,
    53920, 53952, 53984, 54016, 54112, 54144, 54176, 54208, 54304, 54336, 54368, 54400, 54496, 54528, 54560, 54592,
    54688, 54720, 54752, 54784, 54880, 54912, 54944, 54976, 55072, 55104, 55136, 55168, 55264, 55296, 55328, 55360,
    55488, 55520, 55552, 55584, 55680, 55712, 55744, 55776, 55872, 55904, 55936, 55968, 56064, 56096, 56128, 56160,
    56288, 56320, 56352, 56384, 56480, 56512, 56544, 56576, 56704, 56736, 56768, 56800, 56896, 56928, 56960, 56992,
    57120, 57152, 57184, 57216, 57312, 57344, 57376, 57408, 57536, 57568, 57600, 57632, 57728, 57760, 57792, 57824,
    57952, 57984, 58016, 58048, 58144, 58176, 58208, 58240, 58368, 58400, 58432, 58464, 58560, 58592, 58624, 58656,
    58784, 58816, 58848, 58880, 58976, 59008, 59040, 59072, 59200, 59232, 59264, 59296, 59424, 59456, 59488, 59520,
    59648, 59680, 59712, 59744, 59840, 59872, 59904, 59936, 60064, 60096, 60128, 60160, 60288, 60320, 60352, 60384,
    60512, 60544, 60576, 60608, 60736, 60768, 60800, 60832, 60960, 60992, 61024, 61056, 61184, 61216, 61248, 61280,
    61408, 61440, 61472, 61504, 61632, 61664, 61696, 61728, 61856, 61888, 61920, 61952, 62080, 62112, 62144, 62176,
    62304, 62336, 62368, 62400, 62528, 62560, 62592, 62624, 62752, 62784, 62816, 62848, 62976, 63008, 63040, 63072,
    63200, 63232, 63264, 63296, 63424, 63456, 63488, 63520, 63648, 63680, 63712, 63744, 63872, 63904, 63936, 63968,
    64128, 64160, 64192, 64224, 64352, 64384, 64416, 64448, 64576, 64608, 64640, 64672, 64800, 64832, 64864, 64896,
    65056, 65088, 65120, 65152, 65280, 65312, 65344, 65376, 65504, 65536, 65568, 65600, 65728, 65760, 65792, 65824,
    65984, 66016, 66048, 66080, 66208, 66240, 66272, 66304, 66464, 66496, 66528, 66560, 66688, 66720, 66752, 66784,
    66944, 66976, 67008, 67040, 67168, 67200, 67232, 67264, 67424, 67456, 67488, 67520, 67680, 67712, 67744, 67776,
    67936, 67968, 68000, 68032, 68160, 68192, 68224, 68256, 68416, 68448, 68480, 68512, 68672, 68704, 68736, 68768,
    68928, 68960, 68992, 69024, 69152, 69184, 69216, 69248, 69408, 69440, 69472, 69504, 69664, 69696, 69728, 69760,
    69920, 69984, 70048, 70112, 70176, 70240, 70304, 70368, 70432, 70496, 70560, 70624, 70688, 70752, 70816, 70880,
    70944, 71008, 71072, 71136, 71200, 71264, 71328, 71392, 71456, 71520, 71584, 71648, 71712, 71776, 71840, 71904,
    71968, 72032, 72096, 72160, 72224, 72288, 72352, 72416, 72480, 72544, 72608, 72672, 72736, 72800, 72864, 72928,
    73024, 73088, 73152, 73216, 73280, 73344, 73408, 73472, 73536, 73600, 73664, 73728, 73792, 73856, 73920, 73984,
    74080, 74144, 74208, 74272, 74336, 74400, 74464, 74528, 74592, 74656, 74720, 74784, 74848, 74912, 74976, 75040,
    75136, 75200, 75264, 75328, 75392, 75456, 75520, 75584, 75680, 75744, 75808, 75872, 75968, 76032, 76096, 76160,
    76256, 76320, 76384, 76448, 76512, 76576, 76640, 76704, 76800, 76864, 76928, 76992, 77056, 77120, 77184, 77248,
    77344, 77408, 77472, 77536, 77600, 77664, 77728, 77792, 77888, 77952, 78016, 78080, 78176, 78240, 78304, 78368,
    78464, 78528, 78592, 78656, 78752, 78816, 78880, 78944, 79040, 79104, 79168, 79232, 79328, 79392, 79456, 79520,
    79616, 79680, 79744, 79808, 79904, 79968, 80032, 80096, 80192, 80256, 80320, 80384, 80480, 80544, 80608, 80672,
    80768, 80832, 80896, 80960, 81056, 81120, 81184, 81248, 81344, 81408, 81472, 81536, 81632, 81696, 81760, 81824,
    81952, 82016, 82080, 82144, 82240, 82304, 82368, 82432, 82528, 82592, 82656, 82720, 82816, 82880, 82944, 83008,
];

/// Convert an OPM 13-bit block/keycode/fraction plus a 1/64-semitone delta to a phase step
pub fn opm_key_code_to_phase_step(block_freq: u32, delta: i32) -> u32 {
    let table = &OPM_PHASE_STEP;
    let mut block = bitfield(block_freq, 10, 3) as i32;

    // key codes 3, 7, 11, 15 do not exist; fold 16 codes onto 12 semitones
    let adjusted_code = bitfield(block_freq, 6, 4) as i32 - bitfield(block_freq, 8, 2) as i32;
    let mut eff_freq = (adjusted_code << 6) | bitfield(block_freq, 0, 6) as i32;
    eff_freq += delta;

    if eff_freq < 0 {
        eff_freq += 768;
        if block == 0 {
            return table[eff_freq.clamp(0, 767) as usize] >> 7;
        }
        block -= 1;
    } else if eff_freq >= 768 {
        while eff_freq >= 768 {
            eff_freq -= 768;
            block += 1;
        }
        if block > 7 {
            return table[767];
        }
    }

    table[eff_freq as usize] >> (block ^ 7)
}

/// OPN LFO phase modulation adjustment for the top 7 fnum bits
pub fn opn_lfo_pm_phase_adjustment(fnum_bits: u32, pm_sensitivity: u32, lfo_raw_pm: i32) -> i32 {
    // shift pairs (hi nibble, lo nibble) per sensitivity and |pm| step
    const PM_SHIFTS: [[u8; 8]; 8] = [
        [0x77, 0x77, 0x77, 0x77, 0x77, 0x77, 0x77, 0x77],
        [0x77, 0x77, 0x77, 0x77, 0x72, 0x72, 0x72, 0x72],
        [0x77, 0x77, 0x77, 0x72, 0x72, 0x72, 0x17, 0x17],
        [0x77, 0x77, 0x72, 0x72, 0x17, 0x17, 0x12, 0x12],
        [0x77, 0x77, 0x72, 0x17, 0x17, 0x17, 0x12, 0x07],
        [0x77, 0x77, 0x17, 0x12, 0x07, 0x07, 0x02, 0x01],
        [0x77, 0x77, 0x17, 0x12, 0x07, 0x07, 0x02, 0x01],
        [0x77, 0x77, 0x17, 0x12, 0x07, 0x07, 0x02, 0x01],
    ];

    let abs_pm = lfo_raw_pm.unsigned_abs().min(7);
    let shifts = u32::from(PM_SHIFTS[(pm_sensitivity & 7) as usize][abs_pm as usize]);
    let mut adjust = (fnum_bits >> bitfield(shifts, 0, 4)) + (fnum_bits >> bitfield(shifts, 4, 4));
    if pm_sensitivity > 5 {
        adjust <<= pm_sensitivity - 5;
    }
    adjust >>= 2;

    if lfo_raw_pm < 0 {
        -(adjust as i32)
    } else {
        adjust as i32
    }
}

/// Truncate a linear sample to 10.3 floating point and expand it back
///
/// Models the OPM/OPN/OPL DAC input format: a 10-bit mantissa with a 3-bit
/// exponent. Low bits below the exponent are lost.
pub fn roundtrip_fp(value: i32) -> i32 {
    // overflow saturates without passing through the float format
    if value < -32768 {
        return -32768;
    }
    if value > 32767 {
        return 32767;
    }
    let scanvalue = (value ^ (value >> 31)) as u32;
    let leading = (scanvalue << 17).leading_zeros() as i32;
    let exponent = (7 - leading).max(1) - 1;
    (value >> exponent) << exponent
}
