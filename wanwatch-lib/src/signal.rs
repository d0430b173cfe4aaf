/// At or below this level there is no usable signal.
pub const FLOOR_DBM: i32 = -100;
/// At or above this level the signal is considered excellent.
pub const CEILING_DBM: i32 = -50;

/// Maps a signal strength in dBm onto a 0-100 quality percentage.
///
/// Linear across the -100..-50 dBm window, clamped outside of it.
pub fn normalize(dbm: i32) -> u8 {
    if dbm <= FLOOR_DBM {
        return 0;
    }
    if dbm >= CEILING_DBM {
        return 100;
    }
    // window is 50 dBm wide, so each dBm is worth two percent
    (2 * (dbm - FLOOR_DBM)) as u8
}
