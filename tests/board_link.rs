//! Handshake, compatibility gating, and link failure behavior

use std::time::Duration;
use peepico::{
    ic::IcDefinition,
    sim::SimBoard,
    Board, FwVersion, HardwareError, LinkError, ProbeSession, MIN_SUPPORTED_MODEL,
};
use tokio::io::DuplexStream;

async fn open_sim(sim: SimBoard) -> Result<Board<DuplexStream>, HardwareError>
{
    let (client, server) = tokio::io::duplex(256);
    tokio::spawn(sim.serve(server));
    Board::open(client).await
}

#[tokio::test]
async fn handshake_reports_model_and_firmware()
{
    let board = open_sim(SimBoard::echo(4).fw_version("1.2.3")).await.unwrap();

    assert_eq!(board.model(), 4);
    assert_eq!(
        board.fw_version(),
        FwVersion {
            major: 1,
            minor: 2,
            patch: 3
        }
    );
}

#[tokio::test]
async fn outdated_adapter_is_refused()
{
    match open_sim(SimBoard::echo(2)).await {
        Err(HardwareError::ModelTooOld { model: 2, required }) => {
            assert_eq!(required, MIN_SUPPORTED_MODEL);
        }
        _ => panic!("expected the handshake to refuse model 2"),
    }
}

#[tokio::test]
async fn garbage_firmware_version_is_refused()
{
    match open_sim(SimBoard::echo(3).fw_version("definitely.not.numbers")).await {
        Err(HardwareError::InvalidVersion(payload)) => {
            assert_eq!(payload, "definitely.not.numbers");
        }
        _ => panic!("expected the handshake to refuse the version string"),
    }
}

/// A chip's own hardware requirement is gated at session open, not at the
/// adapter handshake.
#[tokio::test]
async fn session_refuses_board_below_chip_requirement()
{
    let definition = IcDefinition::builder("FUTURE")
        .pins_per_side(vec![2])
        .zif_map(vec![1, 2])
        .input_pins(vec![1])
        .output_pins(vec![2])
        .hw_model(4)
        .build()
        .unwrap();

    let board = open_sim(SimBoard::echo(3)).await.unwrap();

    match ProbeSession::open(board, definition, false, &[]).await {
        Err(HardwareError::ModelTooOld { model: 3, required: 4 }) => {}
        _ => panic!("expected the session to refuse the model 3 adapter"),
    }
}

#[tokio::test]
async fn unanswered_command_times_out()
{
    // keep the far end alive but unserved so reads pend instead of hitting EOF
    let (client, _server) = tokio::io::duplex(256);

    match Board::open_with_timeout(client, Duration::from_millis(50)).await {
        Err(HardwareError::Link(LinkError::Timeout)) => {}
        _ => panic!("expected the handshake to time out"),
    }
}

#[tokio::test]
async fn write_pins_round_trips_through_the_wire_protocol()
{
    let mut board = open_sim(SimBoard::echo(3)).await.unwrap();

    let mask = 0x0000_0200_0010_0005u64;
    assert_eq!(board.write_pins(mask).await.unwrap(), mask);
    assert_eq!(board.write_pins(0).await.unwrap(), 0);
    assert_eq!(board.write_pins(u64::MAX).await.unwrap(), u64::MAX);
}

#[tokio::test]
async fn oscillation_query_is_masked()
{
    let mut board = open_sim(SimBoard::echo(3).oscillating(0b1010)).await.unwrap();

    assert_eq!(board.detect_oscillating_pins(u64::MAX).await.unwrap(), 0b1010);
    assert_eq!(board.detect_oscillating_pins(0b0010).await.unwrap(), 0b0010);
    assert_eq!(board.detect_oscillating_pins(0b0100).await.unwrap(), 0);
}
