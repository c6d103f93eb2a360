use orbit_model::format::load_str;
use orbit_model::{BeatData, Chart, Gimmick, GimmickKind, TimeSig};
use proptest::prelude::*;

fn chart_with(gimmicks: &[(i32, i32, GimmickKind, u8)]) -> Chart {
    let mut chart = Chart::new();
    for (measure, tick, kind, layer) in gimmicks {
        let id = chart.next_gimmick_id();
        chart.insert_gimmick(Gimmick::new(id, BeatData::new(*measure, *tick), *kind).with_layer(*layer));
    }
    chart.sort();
    chart.regenerate_timelines();
    chart
}

fn start() -> Vec<(i32, i32, GimmickKind, u8)> {
    vec![
        (0, 0, GimmickKind::BpmChange { bpm: 120.0 }, 0),
        (0, 0, GimmickKind::TimeSigChange(TimeSig::new(4, 4)), 0),
    ]
}

#[test]
fn test_one_measure_at_120() {
    let chart = chart_with(&start());
    let ms = chart.measure_decimal_to_timestamp(1.0);
    assert!((ms - 2000.0).abs() < 1e-9, "one 4/4 measure at 120bpm should be 2000ms, got {ms}");
    let m = chart.timestamp_to_measure_decimal(2000.0);
    assert!((m - 1.0).abs() < 1e-9, "2000ms should be measure 1.0, got {m}");
}

#[test]
fn test_stop_without_hi_speed_restores_unit_speed() {
    let mut gimmicks = start();
    gimmicks.push((2, 0, GimmickKind::StopStart, 0));
    gimmicks.push((3, 0, GimmickKind::StopEnd, 0));
    let chart = chart_with(&gimmicks);

    let inside = chart.scroll_scale().floor_by_raw(2.5, 0).unwrap();
    assert_eq!(inside.speed_multiplier, 0.0);
    let after = chart.scroll_scale().floor_by_raw(3.5, 0).unwrap();
    assert_eq!(after.speed_multiplier, 1.0);

    // The scaled coordinate freezes for the length of the stop.
    let at_stop = chart.scaled_measure_decimal(2.0, true, 0);
    let mid_stop = chart.scaled_measure_decimal(2.75, true, 0);
    assert!((at_stop - mid_stop).abs() < 1e-9);
    let later = chart.scaled_measure_decimal(4.0, true, 0);
    assert!((later - 3.0).abs() < 1e-9);

    // Without hi-speed display the stop is ignored.
    assert!((chart.scaled_measure_decimal(4.0, false, 0) - 4.0).abs() < 1e-9);
}

#[test]
fn test_layers_are_independent() {
    let mut gimmicks = start();
    gimmicks.push((1, 0, GimmickKind::HiSpeedChange { hi_speed: 2.0 }, 4));
    let chart = chart_with(&gimmicks);
    assert!((chart.scaled_measure_decimal(2.0, true, 4) - 3.0).abs() < 1e-9);
    assert!((chart.scaled_measure_decimal(2.0, true, 0) - 2.0).abs() < 1e-9);
}

#[test]
fn test_missing_start_tempo_degrades_to_sentinels() {
    let chart = chart_with(&[(0, 0, GimmickKind::TimeSigChange(TimeSig::new(4, 4)), 0)]);
    assert!(chart.metre().is_empty());
    assert_eq!(chart.measure_decimal_to_timestamp(5.0), 0.0);
    assert_eq!(chart.timestamp_to_measure_decimal(5.0), -1.0);
    assert_eq!(chart.scaled_measure_decimal(5.0, true, 0), 5.0);
    assert_eq!(chart.unscaled_measure_decimal(5.0, true, 0), 5.0);
}

#[test]
fn test_loaded_chart_has_timelines() {
    let text = "\
@SAT_VERSION 3
@GIMMICKS
0 0 0 BPM 180
0 0 1 TIMESIG 3 4
4 0 2 BPM 90
";
    let mut chart = Chart::new();
    load_str(&mut chart, text).unwrap();
    // 3/4 at 180bpm = 1000ms per measure, 3/4 at 90bpm = 2000ms
    assert!((chart.measure_decimal_to_timestamp(4.0) - 4000.0).abs() < 1e-9);
    assert!((chart.measure_decimal_to_timestamp(5.5) - 7000.0).abs() < 1e-9);
    assert!((chart.gimmicks()[2].timestamp - 4000.0).abs() < 1e-9);
}

proptest! {
    #[test]
    fn scaled_round_trip_on_every_layer(
        m in 0.0f64..40.0,
        layer in 0usize..10,
        show in any::<bool>(),
        speeds in proptest::collection::vec(0.1f64..4.0, 10),
    ) {
        let mut gimmicks = start();
        gimmicks.push((6, 0, GimmickKind::BpmChange { bpm: 200.0 }, 0));
        gimmicks.push((10, 0, GimmickKind::TimeSigChange(TimeSig::new(7, 8)), 0));
        for (i, hi_speed) in speeds.iter().enumerate() {
            gimmicks.push((i as i32 * 3 + 1, 240, GimmickKind::HiSpeedChange { hi_speed: *hi_speed }, i as u8));
        }
        let chart = chart_with(&gimmicks);
        let scaled = chart.scaled_measure_decimal(m, show, layer);
        let back = chart.unscaled_measure_decimal(scaled, show, layer);
        prop_assert!((back - m).abs() < 1e-6, "m={m} scaled={scaled} back={back}");
    }
}
