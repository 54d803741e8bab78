use phlegon::modbus::{
    decode_signed_word, first_word, scale_hundredths, scale_signed_tenths, scale_tenths, word_at,
};

#[test]
fn first_word_empty_response_errors() {
    let regs: [u16; 0] = [];
    assert!(first_word(&regs, "soc").is_err());
}

#[test]
fn word_at_out_of_range_errors() {
    let regs = [150u16, 151u16];
    assert_eq!(word_at(&regs, 1, "bank soc").unwrap(), 151);
    assert!(word_at(&regs, 2, "bank soc").is_err());
}

#[test]
fn signed_word_wraps_above_half_range() {
    assert_eq!(decode_signed_word(0), 0);
    assert_eq!(decode_signed_word(32767), 32767);
    assert_eq!(decode_signed_word(32768), -32768);
    // -25 deci-amps as transmitted on the wire
    assert_eq!(decode_signed_word(65511), -25);
    assert_eq!(decode_signed_word(65535), -1);
}

#[test]
fn scale_factors() {
    // Bank SOC 150 -> 15.0 %
    assert_eq!(scale_tenths(150), 15.0);
    // Per-cell SOC 1523 -> 15.23 %
    assert_eq!(scale_hundredths(1523), 15.23);
    // Charging current reads negative
    assert_eq!(scale_signed_tenths(65511), -2.5);
}
