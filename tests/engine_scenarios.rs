use ymfm::phase::PHASE_MASK;
use ymfm::{BusyTiming, Engine, EngineConfig, EnvelopeState, Family, FmError, TimerId, TimerMode};

/// YM2203 channel 0, operator 1 set up as a plain sine at block 4, fnum 0x26a
fn opn_single_operator() -> Engine {
    let mut engine = Engine::new(EngineConfig::new(Family::Opn)).unwrap();
    engine.write(0xb0, 0x00); // algorithm 0, no feedback
    engine.write(0x30, 0x01); // DT 0, MUL 1
    engine.write(0x40, 0x00); // TL 0
    engine.write(0x50, 0x18); // KS 0, AR 24
    engine.write(0x60, 0x00);
    engine.write(0x70, 0x00);
    engine.write(0x80, 0x0f); // SL 0, RR 15
    engine.write(0xa4, 0x22); // block 4, fnum high
    engine.write(0xa0, 0x6a); // fnum low commits the pair
    engine
}

#[test]
fn opn_attack_and_phase_step() {
    let mut engine = opn_single_operator();
    let op = engine.channel_operators(0)[0];
    assert_eq!(op, 0);

    engine.write(0x28, 0x10); // key on operator 1 of channel 0

    // fnum << 1, shifted by block, over 4; MUL 1 keeps it unchanged
    let step = ((0x26a_u32 << 1) << 4) >> 2;

    engine.clock();
    assert_eq!(engine.envelope_state(op), Some(EnvelopeState::Attack));
    assert_eq!(engine.operator_attenuation(op), Some(0x3ff));
    assert_eq!(engine.operator_phase(op), Some(step));

    // the envelope only moves on the third sample (divider 3)
    engine.clock();
    assert_eq!(engine.operator_attenuation(op), Some(0x3ff));
    engine.clock();
    let mut previous = engine.operator_attenuation(op).unwrap();
    assert!(previous < 0x3ff);

    for n in 4..=200u32 {
        engine.clock();
        assert_eq!(engine.operator_phase(op), Some((n * step) & PHASE_MASK));
        let attenuation = engine.operator_attenuation(op).unwrap();
        if engine.envelope_state(op) == Some(EnvelopeState::Attack) {
            assert!(attenuation <= previous, "attack rose at sample {}", n);
        }
        previous = attenuation;
    }
    assert_eq!(previous, 0);
}

#[test]
fn opn_keyed_operator_is_audible() {
    let mut engine = opn_single_operator();
    // make operator 4 (the carrier of algorithm 0) a loud, unmodulated sine
    let carrier = engine.channel_operators(0)[3];
    assert_eq!(carrier, 9);
    engine.write(0x3c, 0x01);
    engine.write(0x4c, 0x00);
    engine.write(0x5c, 0x1f);
    engine.write(0x28, 0xf0);

    let frames = engine.generate(512);
    let peak = frames.iter().map(|frame| frame.data[0].abs()).max().unwrap();
    assert!(peak > 1000, "peak {}", peak);
}

#[test]
fn fnum_high_byte_commits_on_low_write() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opn2)).unwrap();
    engine.write(0x30, 0x01);
    engine.write(0xa4, 0x22);
    engine.generate(4);
    assert_eq!(engine.operator_phase(0), Some(0));

    engine.write(0xa0, 0x6a);
    engine.clock();
    assert_eq!(engine.operator_phase(0), Some(4944));
}

#[test]
fn timer_a_one_shot_raises_irq_on_time() {
    let config = EngineConfig::new(Family::Opn).with_timer_mode(TimerMode::OneShot);
    let mut engine = Engine::new(config).unwrap();

    // TA = 1000 gives a 24 sample period
    engine.write(0x24, 250);
    engine.write(0x25, 0);
    engine.write(0x27, 0x05); // load A, enable A flag
    assert!(engine.timer_running(TimerId::A));
    assert_eq!(engine.timer_remaining(TimerId::A), 24);

    for sample in 1..24 {
        engine.clock();
        assert!(!engine.irq(), "irq early at sample {}", sample);
    }
    engine.clock();
    assert!(engine.irq());
    assert_eq!(engine.read_status() & 0x01, 0x01);
    assert!(!engine.timer_running(TimerId::A));

    // nothing but a status clear drops the line
    engine.generate(5000);
    assert!(engine.irq());

    engine.write(0x27, 0x14); // reset A flag, stop the timer
    assert!(!engine.irq());
    assert_eq!(engine.read_status() & 0x03, 0);
}

#[test]
fn timer_b_repeats() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opm)).unwrap();
    engine.write(0x12, 0xff); // 16 samples
    engine.write(0x14, 0x0a); // load B, enable B flag

    engine.generate(15);
    assert!(!engine.irq());
    engine.clock();
    assert!(engine.irq());

    engine.write(0x14, 0x2a); // clear B flag, keep counting
    assert!(!engine.irq());
    assert!(engine.timer_running(TimerId::B));

    engine.generate(15);
    assert!(!engine.irq());
    engine.clock();
    assert!(engine.irq());
}

#[test]
fn disabled_timer_flag_never_sets_status() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opm)).unwrap();
    engine.write(0x10, 0xff);
    engine.write(0x11, 0x03);
    engine.write(0x14, 0x01); // load A without the flag enable

    engine.generate(64);
    assert!(!engine.irq());
    assert_eq!(engine.read_status() & 0x03, 0);
}

#[test]
fn irq_mask_hides_timer_flag() {
    let config = EngineConfig::new(Family::Opn).with_busy(BusyTiming::None);
    let mut engine = Engine::new(config).unwrap();
    engine.set_irq_mask(0x01);
    engine.write(0x24, 0xff);
    engine.write(0x25, 0x03);
    engine.write(0x27, 0x05);

    engine.generate(4);
    assert_eq!(engine.read_status(), 0x01);
    assert!(!engine.irq());

    engine.set_irq_mask(0);
    assert!(engine.irq());
}

#[test]
fn opl_status_summary_and_irq_reset() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opl2)).unwrap();
    engine.write(0x02, 0xff); // 4 samples
    engine.write(0x04, 0x01); // start timer 1

    engine.generate(4);
    assert!(engine.irq());
    assert_eq!(engine.read_status(), 0xc0);

    engine.write(0x04, 0x80);
    assert!(!engine.irq());
    assert_eq!(engine.read_status(), 0x00);
    assert!(engine.timer_running(TimerId::A));

    engine.generate(4);
    assert!(engine.irq());
}

#[test]
fn opl_masked_timer_counts_silently() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opl)).unwrap();
    engine.write(0x02, 0xff);
    engine.write(0x04, 0x41); // start timer 1 with its flag masked

    engine.generate(16);
    assert!(engine.timer_running(TimerId::A));
    assert!(!engine.irq());
    assert_eq!(engine.read_status(), 0);
}

#[test]
fn csm_pulses_key_on_for_one_sample() {
    let config = EngineConfig::new(Family::Opn).with_timer_mode(TimerMode::OneShot);
    let mut engine = Engine::new(config).unwrap();
    engine.write(0x24, 0xff);
    engine.write(0x25, 0x03); // one sample period
    engine.write(0x27, 0x81); // CSM mode, load A

    let csm_op = engine.channel_operators(2)[0];
    let other_op = engine.channel_operators(0)[0];

    engine.clock();
    assert_eq!(engine.envelope_state(csm_op), Some(EnvelopeState::Attack));
    assert_eq!(engine.envelope_state(other_op), Some(EnvelopeState::Off));

    engine.clock();
    assert_eq!(engine.envelope_state(csm_op), Some(EnvelopeState::Release));
}

#[test]
fn generate_is_deterministic() {
    fn script(engine: &mut Engine) {
        engine.write(0x0f, 0x85); // noise on, frequency 5
        engine.write(0x18, 0xc0); // LFO rate
        engine.write(0x19, 0x40); // AM depth
        engine.write(0x19, 0xc0); // PM depth
        engine.write(0x1b, 0x02); // triangle
        engine.write(0x27, 0xc7); // channel 7: both outputs, algorithm 7
        engine.write(0x2f, 0x4a);
        engine.write(0x3f, 0x33);
        for op in [7, 15, 23, 31] {
            engine.write(0x60 + op, 0x00);
            engine.write(0x80 + op, 0x1f);
            engine.write(0xa0 + op, 0x85);
        }
        engine.write(0x08, 0x7f);
    }

    let mut first = Engine::new(EngineConfig::new(Family::Opm)).unwrap();
    let mut second = Engine::new(EngineConfig::new(Family::Opm)).unwrap();
    script(&mut first);
    script(&mut second);

    let a = first.generate(4096);
    let b = second.generate(4096);
    assert_eq!(a, b);
    assert!(a.iter().any(|frame| frame.data[0] != 0));

    // a cloned engine continues identically
    let mut fork = first.clone();
    assert_eq!(first.generate(1024), fork.generate(1024));
    assert_eq!(first.read_status(), fork.read_status());
}

#[test]
fn phase_wraps_at_period() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opl2)).unwrap();
    let op = engine.channel_operators(0)[0];
    assert_eq!(op, 0);
    engine.write(0x20, 0x0f); // MUL 15 (x30 half-steps)
    engine.write(0xa0, 0xff);
    engine.write(0xb0, 0x1f); // block 7, fnum 0x3ff, key off

    let step = ((0x3ff_u64 << 2) << 7 >> 2) * 30 >> 1;
    for n in 1..=64u64 {
        engine.clock();
        let phase = engine.operator_phase(op).unwrap();
        assert!(phase <= PHASE_MASK);
        assert_eq!(u64::from(phase), (n * step) & u64::from(PHASE_MASK));
    }
}

#[test]
fn opn2_dac_replaces_channel_six() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opn2)).unwrap();
    engine.write(0x2a, 0xff);
    engine.write(0x2b, 0x80);

    let frame = engine.clock();
    let slots = engine.last_mux_slots();
    assert_eq!(slots[5][..2], [258, 258]);
    assert_eq!(slots[0][..2], [4, 4]);
    assert_eq!(frame.data[0], (5 * 4 + 258) * 128 / 6);

    let mut clean = Engine::new(EngineConfig::new(Family::Opn2c)).unwrap();
    clean.write(0x2a, 0xff);
    clean.write(0x2b, 0x80);
    assert_eq!(clean.clock().data[1], 254 * 128 / 6);
}

#[test]
fn opl3_four_op_pairing() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opl3)).unwrap();
    engine.write(0x104, 0x01);
    assert_eq!(engine.channel_operators(0).len(), 2);

    engine.write(0x105, 0x01); // OPL3 mode
    assert_eq!(engine.channel_operators(0), &[0, 3, 6, 9]);
    assert!(engine.channel_operators(3).is_empty());

    engine.write(0x105, 0x00);
    assert_eq!(engine.channel_operators(3).len(), 2);
}

#[test]
fn opll_note_sounds_and_releases() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opll)).unwrap();
    let instrument = [0x21, 0x21, 0x3f, 0x00, 0xf0, 0xf0, 0x0f, 0x0f];
    for (index, &value) in instrument.iter().enumerate() {
        engine.write(index as u16, value);
    }
    engine.write(0x30, 0x00); // user instrument, full volume
    engine.write(0x10, 0x80);
    engine.write(0x20, 0x19); // key on, block 4

    let sounding = engine.generate(2000);
    assert!(sounding.iter().any(|frame| frame.data[0] != 0));

    engine.write(0x20, 0x09); // key off
    engine.generate(20_000);
    let carrier = engine.channel_operators(0)[1];
    assert_eq!(engine.envelope_state(carrier), Some(EnvelopeState::Off));
    assert!(engine.generate(64).iter().all(|frame| frame.data[0] == 0));
}

#[test]
fn opll_retrigger_damps_before_attack() {
    let mut engine = Engine::new(EngineConfig::new(Family::Opll)).unwrap();
    // sustained EG, AR 13, DR 0, SL 0, RR 15
    let instrument = [0x21, 0x21, 0x00, 0x00, 0xd0, 0xd0, 0x0f, 0x0f];
    for (index, &value) in instrument.iter().enumerate() {
        engine.write(index as u16, value);
    }
    engine.write(0x30, 0x00);
    engine.write(0x10, 0x80);
    engine.write(0x20, 0x19); // key on, block 4
    engine.generate(4000);

    let carrier = engine.channel_operators(0)[1];
    assert_eq!(engine.envelope_state(carrier), Some(EnvelopeState::Sustain));
    assert_eq!(engine.operator_attenuation(carrier), Some(0));

    // release for one sample, then key on again while still loud
    engine.write(0x20, 0x09);
    engine.clock();
    assert_eq!(engine.envelope_state(carrier), Some(EnvelopeState::Release));
    engine.write(0x20, 0x19);
    engine.clock();
    assert_eq!(engine.envelope_state(carrier), Some(EnvelopeState::Damp));

    let mut previous = engine.operator_attenuation(carrier).unwrap();
    assert!(previous < 0x200);
    let mut damp_samples = 1;
    let mut attack_start = None;
    for _ in 0..5000 {
        engine.clock();
        let attenuation = engine.operator_attenuation(carrier).unwrap();
        match engine.envelope_state(carrier) {
            Some(EnvelopeState::Damp) => {
                assert!(attenuation < 0x200, "damp reached {attenuation:#x} without attacking");
                assert!(attenuation >= previous);
                damp_samples += 1;
            }
            Some(EnvelopeState::Attack) => {
                attack_start = Some(attenuation);
                break;
            }
            other => panic!("unexpected state {other:?} during damp"),
        }
        previous = attenuation;
    }

    let attack_start = attack_start.expect("damp never handed over to attack");
    assert!(attack_start >= 0x200);
    assert!(damp_samples > 10);
}

#[test]
fn idle_output_is_constant_for_every_family() {
    for family in Family::ALL {
        let mut engine = Engine::new(EngineConfig::new(family)).unwrap();
        let frames = engine.generate(256);
        assert!(
            frames.windows(2).all(|pair| pair[0] == pair[1]),
            "{} idle output drifts",
            family
        );
        assert_eq!(engine.total_samples(), 256);
    }
}

#[test]
fn configuration_rejected() {
    let config = EngineConfig::new(Family::Opn).with_instruments(vec![[0; 8]; 15]);
    assert!(matches!(Engine::new(config), Err(FmError::Config(_))));

    let config = EngineConfig::new(Family::Opl3).with_prescale(4);
    assert!(matches!(Engine::new(config), Err(FmError::Config(_))));

    assert!(matches!(EngineConfig::from_json("{ not json"), Err(FmError::Config(_))));
}

#[test]
fn configuration_from_json() {
    let config = EngineConfig::from_json(r#"{ "family": "opna", "prescale": 3 }"#).unwrap();
    let engine = Engine::new(config).unwrap();
    assert_eq!(engine.prescale(), 3);
    assert_eq!(engine.sample_rate(7_987_200), 7_987_200 / (3 * 24));
}
