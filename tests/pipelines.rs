//! End-to-end round trips across the converter/codec pipelines, using
//! small synthetic fixtures rather than on-disk sample files (none
//! ship with this crate).

use echotools::instruments::{eif, tfi, vgi, FmInstrument};
use echotools::{
    esf, ewf, rom, slz, uftc, vgm, Blob, Channel, Event, EventKind, FmChannel, Volume,
};

fn sample_events() -> Vec<Event> {
    vec![
        Event::new(0, Channel::Fm(FmChannel::Fm1), EventKind::NoteOn(60)),
        Event::new(
            0,
            Channel::Fm(FmChannel::Fm1),
            EventKind::SetVolume(Volume::new(100)),
        ),
        Event::new(48, Channel::Fm(FmChannel::Fm1), EventKind::NoteOff),
        Event::new(48, Channel::Fm(FmChannel::Fm1), EventKind::NoteOn(64)),
        Event::new(96, Channel::Fm(FmChannel::Fm1), EventKind::NoteOff),
    ]
}

#[test]
fn esf_stream_assembles_and_ends_with_terminator() {
    let stream = esf::assemble(&sample_events(), false);
    assert!(!stream.is_empty());
}

#[test]
fn esf_to_vgm_assembles_with_gd3_tags() {
    let stream = esf::assemble(&sample_events(), true);
    let mut instrument = FmInstrument::default();
    instrument.algorithm = 7;
    let fm_instrument = eif::write(&instrument).unwrap();

    let gd3 = vgm::Gd3Tags {
        title: "Test Track".into(),
        game: "Test Game".into(),
        ..vgm::Gd3Tags::default()
    };

    let vgm_data = vgm::assemble(&stream, &[fm_instrument], &[], &[], true, Some(&gd3)).unwrap();

    assert_eq!(&vgm_data[0..4], b"Vgm ");
}

#[test]
fn tfi_eif_round_trip_preserves_operators() {
    let mut instrument = FmInstrument::default();
    instrument.algorithm = 3;
    instrument.feedback = 5;
    instrument.operators[0].mul = 2;
    instrument.operators[0].dt = 4;

    let eif_bytes = eif::write(&instrument).unwrap();
    let reloaded = eif::parse(&eif_bytes).unwrap();
    assert_eq!(reloaded.algorithm, instrument.algorithm);
    assert_eq!(reloaded.feedback, instrument.feedback);
    assert_eq!(reloaded.operators[0].mul, instrument.operators[0].mul);
    assert_eq!(reloaded.operators[0].dt, instrument.operators[0].dt);

    let tfi_bytes = tfi::write(&instrument);
    let from_tfi = tfi::parse(&tfi_bytes).unwrap();
    assert_eq!(from_tfi, instrument);
}

#[test]
fn vgi_drops_lfo_fields_but_keeps_operators() {
    // VGI is TFI's one-byte-per-field layout with an extra whole-voice
    // LFO byte after algorithm/feedback and another after the last
    // operator; build one from a TFI blob and confirm the operator
    // data survives while the LFO bytes are silently dropped.
    let mut instrument = FmInstrument::default();
    instrument.algorithm = 1;
    instrument.operators[0].mul = 9;
    let tfi_bytes = tfi::write(&instrument);

    let mut vgi_bytes = Vec::with_capacity(tfi_bytes.len() + 2);
    vgi_bytes.extend_from_slice(&tfi_bytes[0..2]);
    vgi_bytes.push(0x00); // whole-voice LFO enable/frequency
    vgi_bytes.extend_from_slice(&tfi_bytes[2..]);
    vgi_bytes.push(0x00); // per-voice AMS/FMS sensitivity

    let parsed = vgi::parse(&vgi_bytes).unwrap();
    assert_eq!(parsed.algorithm, instrument.algorithm);
    assert_eq!(parsed.operators[0].mul, instrument.operators[0].mul);
}

#[test]
fn ewf_escapes_terminator_byte_and_appends_one() {
    let pcm = vec![0x10, 0xFF, 0x20, 0xFF];
    let encoded = ewf::write(&pcm);
    assert_eq!(encoded, vec![0x10, 0xFE, 0x20, 0xFE, 0xFF]);
}

#[test]
fn slz_round_trips_both_formats() {
    let data: Vec<u8> = (0..=255u8).chain(0..=255u8).collect();
    for format in [slz::Format::Slz16, slz::Format::Slz24] {
        let compressed = slz::compress(&data, format).unwrap();
        let decompressed = slz::decompress(&compressed, format).unwrap();
        assert_eq!(decompressed, data);
    }
}

#[test]
fn uftc_round_trips_a_tile_range() {
    let mut tiles = Vec::new();
    for i in 0..8u8 {
        tiles.extend_from_slice(&[i; 32]);
    }
    let compressed = uftc::compress(&tiles).unwrap();
    let decompressed = uftc::decompress(&compressed, 0, 8).unwrap();
    assert_eq!(decompressed, tiles);
}

#[test]
fn rom_fixup_pads_and_recomputes_checksum() {
    let mut image = vec![0u8; 0x300];
    rom::pad(&mut image);
    rom::compute_checksum(&mut image);
    rom::set_title(&mut image, "ECHOTOOLS TEST").unwrap();
    rom::set_copyright(&mut image, "ABCD").unwrap();
    rom::set_serial(&mut image, "GM-00001").unwrap();
    rom::set_revision(&mut image, "01").unwrap();
    rom::compute_checksum(&mut image);

    assert!(image.len() >= 0x300);
    assert_eq!(image.len(), rom::pad_size(image.len()));
}

#[test]
fn blob_save_then_load_round_trips_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.bin");
    let payload = vec![1u8, 2, 3, 4, 5];
    Blob::save(&path, &payload).unwrap();
    let loaded = Blob::load(&path).unwrap();
    assert_eq!(loaded.as_slice(), payload.as_slice());
}
