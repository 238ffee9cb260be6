//! End-to-end probing sessions against a simulated adapter

use std::sync::{
    atomic::{ AtomicU32, Ordering },
    Arc,
    Mutex,
};
use tokio::io::DuplexStream;
use peepico::{
    ic::pin_bit,
    sim::SimBoard,
    Board, IcDefinition, LinkError, PinState, ProbeCmd, ProbeError, ProbeSession,
};

/// DIP-20 with the ground position on logical pin 10 and power on pin 20
///
/// Outputs at 12 and 19, bidirectional pins at 13..=18, a clock-capable
/// input at pin 1.
fn dip20() -> IcDefinition
{
    IcDefinition::builder("SIM20")
        .pins_per_side(vec![10, 10])
        .zif_map(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 21, 30, 31, 32, 33, 34, 35, 36, 37, 38, 42])
        .clock_pins(vec![1])
        .input_pins(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 11])
        .io_pins(vec![13, 14, 15, 16, 17, 18])
        .output_pins(vec![12, 19])
        .hw_model(3)
        .build()
        .unwrap()
}

/// Physical socket bit of a logical pin on the [`dip20`] seating
fn physical_bit(def: &IcDefinition, pin: u8) -> u64
{
    def.logical_to_physical(pin_bit(pin))
}

async fn connect(
    sim: SimBoard,
    check_hiz: bool,
    skip_hiz: &[u8],
) -> ProbeSession<DuplexStream>
{
    let (client, server) = tokio::io::duplex(256);
    tokio::spawn(sim.serve(server));

    let board = Board::open(client).await.unwrap();
    ProbeSession::open(board, dip20(), check_hiz, skip_hiz).await.unwrap()
}

/// Everything except pin 15 floats per the adapter's pulls; the engine must
/// report pin 15 as Hi-Z after a single apply+classify cycle.
#[tokio::test]
async fn floating_output_is_reported_hiz()
{
    // skip every candidate but 15 so the round probes exactly one pin
    let mut session = connect(SimBoard::echo(3), true, &[12, 13, 14, 16, 17, 18, 19]).await;
    assert_eq!(session.hiz_candidates(), &[15]);

    let snapshot = session.exec(ProbeCmd::Apply).await.unwrap();

    assert_eq!(snapshot.pin_state(15), PinState::HiZ);
    assert_eq!(snapshot.hiz_mask(), pin_bit(15));
    // a confirmed Hi-Z pin stays eligible for the next round
    assert_eq!(session.hiz_candidates(), &[15]);
}

/// A pin whose perturbation disturbs another pin is not a floating output;
/// it must be pruned and stay pruned in later rounds.
#[tokio::test]
async fn coupled_candidate_is_pruned_permanently()
{
    let def = dip20();
    let p15 = physical_bit(&def, 15);
    let p12 = physical_bit(&def, 12);

    // driving pin 15 high also flips pin 12: a feedback path, not a float
    let sim = SimBoard::with_chip(3, move |mask| {
        if mask & p15 != 0 {
            mask ^ p12
        }
        else {
            mask
        }
    });

    let mut session = connect(sim, true, &[13, 14, 16, 17, 18, 19]).await;
    assert_eq!(session.hiz_candidates(), &[12, 15]);

    let snapshot = session.exec(ProbeCmd::Apply).await.unwrap();
    assert_eq!(snapshot.pin_state(12), PinState::HiZ);
    assert_ne!(snapshot.pin_state(15), PinState::HiZ);
    assert_eq!(session.hiz_candidates(), &[12]);

    // the removal persists across subsequent classification rounds
    let snapshot = session.exec(ProbeCmd::Apply).await.unwrap();
    assert_ne!(snapshot.pin_state(15), PinState::HiZ);
    assert_eq!(session.hiz_candidates(), &[12]);
}

/// A pin the chip actively drives reads back unchanged under perturbation
/// and is neither Hi-Z nor pruned.
#[tokio::test]
async fn driven_output_is_not_hiz()
{
    let def = dip20();
    let p19 = physical_bit(&def, 19);

    // the chip holds pin 19 low no matter what is written
    let sim = SimBoard::with_chip(3, move |mask| mask & !p19);

    let mut session = connect(sim, true, &[12, 13, 14, 15, 16, 17, 18]).await;
    assert_eq!(session.hiz_candidates(), &[19]);

    let snapshot = session.exec(ProbeCmd::Apply).await.unwrap();

    assert_eq!(snapshot.pin_state(19), PinState::Low);
    assert_eq!(snapshot.hiz_mask(), 0);
    assert_eq!(session.hiz_candidates(), &[19]);
}

/// A link failure mid-classification aborts the command without committing
/// that round's pruning, and the session stays usable afterwards.
#[tokio::test]
async fn failed_round_does_not_commit_pruning()
{
    let def = dip20();
    let p12 = physical_bit(&def, 12);
    let p15 = physical_bit(&def, 15);

    // perturbing pin 12 disturbs pin 15, so a completed round would prune 12.
    // the handshake and session open take four commands and the first classify
    // round five more; NAK the eighth (pin 15's perturbation write) so the
    // round dies after pin 12's prune has been decided but before it commits.
    let sim = SimBoard::with_chip(3, move |mask| {
        if mask & p12 != 0 {
            mask ^ p15
        }
        else {
            mask
        }
    })
    .nak_command(8);

    let mut session = connect(sim, true, &[13, 14, 16, 17, 18, 19]).await;
    assert_eq!(session.hiz_candidates(), &[12, 15]);

    match session.exec(ProbeCmd::Apply).await {
        Err(ProbeError::Link(LinkError::Nak(_))) => {}
        _ => panic!("expected the round to abort on the rejected command"),
    }

    // the aborted round left the candidate list untouched
    assert_eq!(session.hiz_candidates(), &[12, 15]);

    // the session is still usable; the next full round prunes 12 and
    // confirms 15 floating
    let snapshot = session.exec(ProbeCmd::Apply).await.unwrap();
    assert_eq!(snapshot.pin_state(15), PinState::HiZ);
    assert_ne!(snapshot.pin_state(12), PinState::HiZ);
    assert_eq!(session.hiz_candidates(), &[15]);
}

#[tokio::test]
async fn clear_then_apply_yields_zero_value()
{
    let mut session = connect(SimBoard::echo(3), false, &[]).await;

    session.set_pin(1, true).unwrap();
    session.set_pin(3, true).unwrap();
    session.exec(ProbeCmd::Apply).await.unwrap();
    assert_eq!(session.requested_value(), pin_bit(1) | pin_bit(3));

    let snapshot = session.exec(ProbeCmd::Clear).await.unwrap();

    assert_eq!(session.requested_value(), 0);
    // with no always-high pins, the echo board reads everything low
    assert_eq!(snapshot.reading(), 0);
    for pin in 1..=20 {
        assert_eq!(snapshot.pin_state(pin), PinState::Low);
    }
}

#[tokio::test]
async fn oscillating_pins_are_reported()
{
    let def = dip20();
    let sim = SimBoard::echo(3).oscillating(physical_bit(&def, 12));

    let mut session = connect(sim, false, &[]).await;
    let snapshot = session.exec(ProbeCmd::Apply).await.unwrap();

    assert_eq!(snapshot.pin_state(12), PinState::Oscillating);
    assert_eq!(snapshot.oscillation_mask(), pin_bit(12));
    assert_eq!(snapshot.pin_state(13), PinState::Low);
}

#[tokio::test]
async fn hiz_takes_precedence_over_oscillation()
{
    let def = dip20();
    let sim = SimBoard::echo(3).oscillating(physical_bit(&def, 12));

    let mut session = connect(sim, true, &[13, 14, 15, 16, 17, 18, 19]).await;
    let snapshot = session.exec(ProbeCmd::Apply).await.unwrap();

    assert_eq!(snapshot.pin_state(12), PinState::HiZ);
}

#[tokio::test]
async fn clock_command_pulses_exactly_one_rising_edge()
{
    let def = dip20();
    let clk = physical_bit(&def, 1);
    let edges = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&edges);
    let mut level = false;
    let sim = SimBoard::with_chip(3, move |mask| {
        let now = mask & clk != 0;
        if now && !level {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        level = now;
        mask
    });

    let mut session = connect(sim, false, &[]).await;
    session.exec(ProbeCmd::ClockPin(1)).await.unwrap();

    assert_eq!(edges.load(Ordering::SeqCst), 1);
    // the clock toggle is left cleared after the pulse
    assert_eq!(session.requested_value() & pin_bit(1), 0);
}

#[tokio::test]
async fn clock_command_rejects_non_clock_pins()
{
    let mut session = connect(SimBoard::echo(3), false, &[]).await;

    match session.exec(ProbeCmd::ClockPin(5)).await {
        Err(ProbeError::NotAClockPin(5)) => {}
        other => panic!("expected NotAClockPin, got {:?}", other.map(|s| s.reading())),
    }
}

#[tokio::test]
async fn power_cycle_drops_and_restores_the_rail()
{
    let transitions: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));

    let observer = Arc::clone(&transitions);
    let sim = SimBoard::echo(3).on_power(move |on| observer.lock().unwrap().push(on));

    let mut session = connect(sim, false, &[]).await;
    session.exec(ProbeCmd::PowerCycle).await.unwrap();

    // session open powers on, then the cycle drops and restores the rail
    assert_eq!(transitions.lock().unwrap().as_slice(), &[true, false, true]);
}

#[tokio::test]
async fn always_high_pins_are_ored_into_every_apply()
{
    let def_with_hi = IcDefinition::builder("SIM20HI")
        .pins_per_side(vec![10, 10])
        .zif_map(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 21, 30, 31, 32, 33, 34, 35, 36, 37, 38, 42])
        .input_pins(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 11])
        .io_pins(vec![13, 14, 15, 16, 17, 18])
        .output_pins(vec![12, 19])
        .adapter_hi_pins(vec![11])
        .hw_model(3)
        .build()
        .unwrap();

    let (client, server) = tokio::io::duplex(256);
    tokio::spawn(SimBoard::echo(3).serve(server));
    let board = Board::open(client).await.unwrap();
    let mut session = ProbeSession::open(board, def_with_hi, false, &[]).await.unwrap();

    let snapshot = session.exec(ProbeCmd::Apply).await.unwrap();

    // pin 11 is driven high by the adapter even though the operator asked for nothing
    assert_eq!(session.requested_value(), 0);
    assert_eq!(snapshot.pin_state(11), PinState::High);
}
